//! Concrete chunk canvas: pixel storage, paints, compositing and the per-replay drawing state.

pub(crate) mod canvas;
pub(crate) mod composite;
pub(crate) mod painter;
pub mod pattern;
