use std::io::Cursor;

use crate::foundation::core::{ChunkKey, Rgba8};
use crate::foundation::error::{MimageError, MimageResult};
use crate::foundation::math::{premultiply, unpremultiply};
use crate::raster::composite::PremulRgba8;

/// Pixels of one resident chunk: a square premultiplied RGBA8 pixmap.
pub(crate) struct ChunkCanvas {
    size: u16,
    pixmap: vello_cpu::Pixmap,
}

impl std::fmt::Debug for ChunkCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCanvas").field("size", &self.size).finish()
    }
}

impl ChunkCanvas {
    /// Fully transparent canvas of `size x size` pixels.
    pub(crate) fn blank(size: u16) -> Self {
        Self {
            size,
            pixmap: vello_cpu::Pixmap::new(size, size),
        }
    }

    /// Decode a persisted PNG artifact.
    pub(crate) fn decode(key: ChunkKey, bytes: &[u8], size: u16) -> MimageResult<Self> {
        let rgba = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|source| MimageError::Decode { key, source })?
            .to_rgba8();
        if rgba.dimensions() != (u32::from(size), u32::from(size)) {
            return Err(MimageError::Decode {
                key,
                source: image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                )),
            });
        }

        let mut canvas = Self::blank(size);
        for (dst, src) in canvas
            .pixmap
            .data_as_u8_slice_mut()
            .chunks_exact_mut(4)
            .zip(rgba.as_raw().chunks_exact(4))
        {
            dst.copy_from_slice(&premultiply([src[0], src[1], src[2], src[3]]));
        }
        Ok(canvas)
    }

    /// Encode as a straight-alpha PNG.
    pub(crate) fn encode(&self, key: ChunkKey) -> MimageResult<Vec<u8>> {
        let mut straight = Vec::with_capacity(self.pixmap.data_as_u8_slice().len());
        for px in self.pixmap.data_as_u8_slice().chunks_exact(4) {
            straight.extend_from_slice(&unpremultiply([px[0], px[1], px[2], px[3]]));
        }
        let side = u32::from(self.size);
        let img = image::RgbaImage::from_raw(side, side, straight)
            .ok_or_else(|| MimageError::internal("chunk pixel buffer has the wrong length"))?;

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|source| MimageError::Encode { key, source })?;
        Ok(buf)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * usize::from(self.size) + x as usize) * 4
    }

    /// Premultiplied pixel at chunk-local `(x, y)`; callers keep coordinates in range.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = self.index(x, y);
        let d = self.pixmap.data_as_u8_slice();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    pub(crate) fn set_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let i = self.index(x, y);
        self.pixmap.data_as_u8_slice_mut()[i..i + 4].copy_from_slice(&px);
    }

    /// Straight-alpha color at chunk-local `(x, y)`.
    pub(crate) fn color(&self, x: u32, y: u32) -> Rgba8 {
        Rgba8::from_premultiplied(self.pixel(x, y))
    }

    pub(crate) fn fill_all(&mut self, px: PremulRgba8) {
        for dst in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            dst.copy_from_slice(&px);
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_canvas_is_transparent() {
        let c = ChunkCanvas::blank(4);
        assert_eq!(c.color(3, 3), Rgba8::TRANSPARENT);
    }

    #[test]
    fn png_roundtrip_keeps_opaque_pixels() {
        let key = ChunkKey::new(0, 0);
        let mut c = ChunkCanvas::blank(8);
        c.set_pixel(1, 2, Rgba8::opaque(255, 0, 0).premultiplied());
        c.set_pixel(7, 7, Rgba8::opaque(1, 2, 3).premultiplied());

        let back = ChunkCanvas::decode(key, &c.encode(key).unwrap(), 8).unwrap();
        assert_eq!(back.color(1, 2), Rgba8::opaque(255, 0, 0));
        assert_eq!(back.color(7, 7), Rgba8::opaque(1, 2, 3));
        assert_eq!(back.color(0, 0), Rgba8::TRANSPARENT);
    }

    #[test]
    fn decode_rejects_garbage_and_wrong_size() {
        let key = ChunkKey::new(2, 3);
        let err = ChunkCanvas::decode(key, b"not a png", 8).unwrap_err();
        assert!(matches!(err, MimageError::Decode { key: k, .. } if k == key));

        let other = ChunkCanvas::blank(4).encode(key).unwrap();
        assert!(matches!(
            ChunkCanvas::decode(key, &other, 8),
            Err(MimageError::Decode { .. })
        ));
    }
}
