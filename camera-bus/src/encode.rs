use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};

use crate::error::CaptureError;
use crate::frame::{EncodedFrame, FrameShape};

/// JPEG compression stage. Stateless; deterministic for a fixed quality.
#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn encode(
        &self,
        pixels: &[u8],
        shape: &FrameShape,
        sequence: u64,
    ) -> Result<EncodedFrame, CaptureError> {
        let color_type = match shape.channels {
            1 => ColorType::Luma,
            3 => ColorType::Rgb,
            4 => ColorType::Rgba,
            other => return Err(CaptureError::UnsupportedChannels(other)),
        };

        let mut out = Vec::new();
        let encoder = Encoder::new(&mut out, self.quality);
        encoder.encode(
            pixels,
            shape.width as u16,
            shape.height as u16,
            color_type,
        )?;

        Ok(EncodedFrame {
            jpeg: Bytes::from(out),
            sequence,
        })
    }
}

#[cfg(test)]
#[path = "encode_test.rs"]
mod encode_test;
