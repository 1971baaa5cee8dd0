use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Pixel geometry of the raw stream. Fixed for the lifetime of a capture
/// session; every frame must match it exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameShape {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Exact byte length of one interleaved frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// One decoded frame: exactly `shape.frame_size()` interleaved bytes plus a
/// per-session sequence number starting at 1.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub data: Bytes,
    pub shape: FrameShape,
    pub sequence: u64,
}

impl Display for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RawFrame {{ #{} {}x{}x{} }}",
            self.sequence, self.shape.width, self.shape.height, self.shape.channels
        )
    }
}

/// Compressed frame ready for transport. Immutable; clones share the buffer.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub jpeg: Bytes,
    pub sequence: u64,
}

pub type Color = [u8; 3];

pub const RED: Color = [255, 0, 0];
pub const GREEN: Color = [0, 255, 0];
pub const BLUE: Color = [0, 0, 255];

/// Annotation primitive rendered into a frame in place.
#[derive(Clone, Debug)]
pub enum Overlay {
    Rect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        color: Color,
        thickness: u32,
    },
    Polyline {
        points: Vec<(u32, u32)>,
        color: Color,
    },
}

/// Draw all overlays into an interleaved pixel buffer. Coordinates outside
/// the frame are clipped, never panicked on.
pub fn draw_overlays(pixels: &mut [u8], shape: &FrameShape, overlays: &[Overlay]) {
    for overlay in overlays {
        match overlay {
            Overlay::Rect {
                x,
                y,
                width,
                height,
                color,
                thickness,
            } => {
                draw_rect(pixels, shape, *x, *y, *width, *height, *color, *thickness);
            }
            Overlay::Polyline { points, color } => {
                for pair in points.windows(2) {
                    draw_line(pixels, shape, pair[0], pair[1], *color);
                }
            }
        }
    }
}

fn put_pixel(pixels: &mut [u8], shape: &FrameShape, x: i64, y: i64, color: Color) {
    if x < 0 || y < 0 || x >= shape.width as i64 || y >= shape.height as i64 {
        return;
    }
    let channels = shape.channels as usize;
    let offset = (y as usize * shape.width as usize + x as usize) * channels;
    if channels >= 3 {
        pixels[offset] = color[0];
        pixels[offset + 1] = color[1];
        pixels[offset + 2] = color[2];
    } else {
        // single-channel: approximate luma
        let luma =
            (color[0] as u16 * 77 + color[1] as u16 * 150 + color[2] as u16 * 29) >> 8;
        pixels[offset] = luma as u8;
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_rect(
    pixels: &mut [u8],
    shape: &FrameShape,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    color: Color,
    thickness: u32,
) {
    let thickness = thickness.max(1) as i64;
    let (x0, y0) = (x as i64, y as i64);
    let (x1, y1) = (x as i64 + width as i64, y as i64 + height as i64);

    for t in 0..thickness {
        for px in x0..=x1 {
            put_pixel(pixels, shape, px, y0 + t, color);
            put_pixel(pixels, shape, px, y1 - t, color);
        }
        for py in y0..=y1 {
            put_pixel(pixels, shape, x0 + t, py, color);
            put_pixel(pixels, shape, x1 - t, py, color);
        }
    }
}

/// Bresenham segment between two points.
fn draw_line(
    pixels: &mut [u8],
    shape: &FrameShape,
    from: (u32, u32),
    to: (u32, u32),
    color: Color,
) {
    let (mut x0, mut y0) = (from.0 as i64, from.1 as i64);
    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(pixels, shape, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod frame_test;
