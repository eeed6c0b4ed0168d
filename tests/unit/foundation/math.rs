use super::*;

#[test]
fn premultiply_half_alpha() {
    assert_eq!(premultiply([200, 100, 0, 128]), [100, 50, 0, 128]);
}

#[test]
fn unpremultiply_inverts_premultiply_within_rounding() {
    let px = [200, 100, 40, 128];
    let back = unpremultiply(premultiply(px));
    for i in 0..3 {
        assert!((i16::from(back[i]) - i16::from(px[i])).abs() <= 2);
    }
    assert_eq!(back[3], 128);
}

#[test]
fn lerp_endpoints_are_exact() {
    let a = [10, 20, 30, 40];
    let b = [200, 210, 220, 230];
    assert_eq!(lerp_rgba8(a, b, 0), a);
    assert_eq!(lerp_rgba8(a, b, 255), b);
}
