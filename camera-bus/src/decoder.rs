use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CaptureError;
use crate::frame::{FrameShape, RawFrame};

/// Splits a delimiter-free byte stream into exact-size frames.
///
/// The stream ends cleanly when the reader returns EOF on a frame boundary;
/// a partial frame is a hard error and terminates the sequence, since raw
/// pixel data offers no marker to resynchronize on. A finished decoder stays
/// finished; a fresh source is needed to resume.
pub struct FrameDecoder<R> {
    reader: R,
    shape: FrameShape,
    sequence: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(reader: R, shape: FrameShape) -> Self {
        Self {
            reader,
            shape,
            sequence: 0,
            finished: false,
        }
    }

    /// Number of complete frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.sequence
    }

    /// Read the next frame. `Ok(None)` is clean end-of-stream.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if self.finished {
            return Ok(None);
        }

        let expected = self.shape.frame_size();
        let mut buf = vec![0u8; expected];
        let mut filled = 0usize;

        while filled < expected {
            let n = match self.reader.read(&mut buf[filled..]).await {
                Ok(n) => n,
                Err(err) => {
                    self.finished = true;
                    return Err(CaptureError::Read(err));
                }
            };
            if n == 0 {
                self.finished = true;
                if filled == 0 {
                    return Ok(None);
                }
                return Err(CaptureError::TruncatedFrame {
                    expected,
                    got: filled,
                });
            }
            filled += n;
        }

        self.sequence += 1;
        Ok(Some(RawFrame {
            data: Bytes::from(buf),
            shape: self.shape,
            sequence: self.sequence,
        }))
    }

    /// Adapt the decoder into a frame stream terminating at EOF or on the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<RawFrame, CaptureError>>
    where
        R: Send,
    {
        futures::stream::unfold(Some(self), |decoder| async move {
            let mut decoder = decoder?;
            match decoder.next_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(decoder))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
