use crate::foundation::math::{mul_div255_u16, mul_div255_u8};

pub(crate) type PremulRgba8 = [u8; 4];

/// Premultiplied source-over.
pub(crate) fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255_u8(u16::from(dst[i]), inv));
    }
    out
}

/// How strongly a paint reaches a pixel: shape coverage attenuated by the mask.
///
/// A mask value of 255 shields the pixel entirely.
pub(crate) fn effective_alpha(coverage: u8, mask: u8) -> u8 {
    mul_div255_u8(u16::from(coverage), 255 - u16::from(mask))
}

/// Scale a straight-alpha color by `weight` and premultiply it.
pub(crate) fn weighted_premul(color: [u8; 4], weight: u8) -> PremulRgba8 {
    let a = mul_div255_u16(u16::from(color[3]), u16::from(weight));
    if a == 0 {
        return [0, 0, 0, 0];
    }
    [
        mul_div255_u8(u16::from(color[0]), a),
        mul_div255_u8(u16::from(color[1]), a),
        mul_div255_u8(u16::from(color[2]), a),
        a as u8,
    ]
}
