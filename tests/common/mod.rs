#![allow(dead_code)]

use std::path::Path;
use std::time::{Duration, Instant};

use mimage::{CacheOpts, MimageOpts};

pub const RED: mimage::Rgba8 = mimage::Rgba8::opaque(255, 0, 0);
pub const BLUE: mimage::Rgba8 = mimage::Rgba8::opaque(0, 0, 255);

/// Eviction effectively disabled so dirty state can be inspected.
pub fn quiet_cache() -> CacheOpts {
    CacheOpts {
        evict_interval: Duration::from_secs(3600),
    }
}

pub fn opts(dir: &Path, chunk_size: u32) -> MimageOpts {
    MimageOpts {
        chunk_size,
        directory: Some(dir.to_path_buf()),
        workers: 4,
        cache: quiet_cache(),
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Route crate logs to the test harness; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
