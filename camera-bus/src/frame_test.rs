// ============================================================================
// Frame geometry and overlay drawing tests
// ============================================================================

use super::{FrameShape, GREEN, Overlay, RED, draw_overlays};

#[test]
fn test_frame_size() {
    assert_eq!(FrameShape::new(640, 480, 3).frame_size(), 921_600);
    assert_eq!(FrameShape::new(2, 2, 1).frame_size(), 4);
}

#[test]
fn test_rect_draws_outline_only() {
    let shape = FrameShape::new(8, 8, 3);
    let mut pixels = vec![0u8; shape.frame_size()];

    draw_overlays(
        &mut pixels,
        &shape,
        &[Overlay::Rect {
            x: 1,
            y: 1,
            width: 4,
            height: 4,
            color: GREEN,
            thickness: 1,
        }],
    );

    let at = |x: usize, y: usize| {
        let offset = (y * 8 + x) * 3;
        [pixels[offset], pixels[offset + 1], pixels[offset + 2]]
    };
    assert_eq!(at(1, 1), GREEN);
    assert_eq!(at(5, 5), GREEN);
    // interior untouched
    assert_eq!(at(3, 3), [0, 0, 0]);
}

#[test]
fn test_rect_clips_outside_frame() {
    let shape = FrameShape::new(4, 4, 3);
    let mut pixels = vec![0u8; shape.frame_size()];

    // extends well past the right and bottom edges
    draw_overlays(
        &mut pixels,
        &shape,
        &[Overlay::Rect {
            x: 2,
            y: 2,
            width: 100,
            height: 100,
            color: RED,
            thickness: 3,
        }],
    );

    assert!(pixels.iter().any(|&b| b != 0));
}

#[test]
fn test_polyline_marks_endpoints() {
    let shape = FrameShape::new(8, 8, 3);
    let mut pixels = vec![0u8; shape.frame_size()];

    draw_overlays(
        &mut pixels,
        &shape,
        &[Overlay::Polyline {
            points: vec![(0, 0), (7, 7), (7, 0)],
            color: RED,
        }],
    );

    let at = |x: usize, y: usize| pixels[(y * 8 + x) * 3];
    assert_eq!(at(0, 0), 255);
    assert_eq!(at(7, 7), 255);
    assert_eq!(at(7, 0), 255);
}

#[test]
fn test_single_channel_draw() {
    let shape = FrameShape::new(4, 4, 1);
    let mut pixels = vec![0u8; shape.frame_size()];

    draw_overlays(
        &mut pixels,
        &shape,
        &[Overlay::Polyline {
            points: vec![(0, 0), (3, 0)],
            color: GREEN,
        }],
    );

    // top row written with the luma approximation, rest untouched
    assert!(pixels[..4].iter().all(|&b| b > 0));
    assert!(pixels[4..].iter().all(|&b| b == 0));
}

#[test]
fn test_empty_polyline_is_noop() {
    let shape = FrameShape::new(4, 4, 3);
    let mut pixels = vec![0u8; shape.frame_size()];

    draw_overlays(
        &mut pixels,
        &shape,
        &[Overlay::Polyline {
            points: Vec::new(),
            color: RED,
        }],
    );

    assert!(pixels.iter().all(|&b| b == 0));
}
