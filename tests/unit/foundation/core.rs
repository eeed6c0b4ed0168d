use super::*;

#[test]
fn pixel_rect_intersection_and_emptiness() {
    let a = PixelRect::new(0, 0, 10, 10);
    let b = PixelRect::new(5, -5, 20, 5);
    assert_eq!(a.intersect(b), PixelRect::new(5, 0, 10, 5));
    assert!(a.intersect(PixelRect::new(10, 0, 20, 10)).is_empty());
    assert!(PixelRect::new(3, 3, 1, 9).is_empty());
    assert_eq!(PixelRect::new(3, 3, 1, 9).width(), 0);
}

#[test]
fn pixel_rect_contains_is_half_open() {
    let r = PixelRect::from_origin_size(2, 2, 3, 3);
    assert!(r.contains(2, 2));
    assert!(r.contains(4, 4));
    assert!(!r.contains(5, 4));
    assert!(!r.contains(1, 2));
}

#[test]
fn rgba8_premul_roundtrip_for_opaque_and_transparent() {
    let red = Rgba8::opaque(255, 0, 0);
    assert_eq!(red.premultiplied(), [255, 0, 0, 255]);
    assert_eq!(Rgba8::from_premultiplied(red.premultiplied()), red);
    assert_eq!(
        Rgba8::from_premultiplied(Rgba8::new(10, 20, 30, 0).premultiplied()),
        Rgba8::TRANSPARENT
    );
}

#[test]
fn chunk_key_display() {
    assert_eq!(ChunkKey::new(-1, 4).to_string(), "(-1, 4)");
}
