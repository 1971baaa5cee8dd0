use std::time::Duration;

/// Failures raised by the capture chain and the frame stages.
///
/// Only `Spawn`, `TruncatedFrame` and `Read` end a capture session; `Encode`
/// and `UnsupportedChannels` drop the affected frame and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to spawn {stage} process `{command}`: {source}")]
    Spawn {
        stage: &'static str,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    #[error("read from converter failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("jpeg encode failed: {0}")]
    Encode(#[from] jpeg_encoder::EncodingError),

    #[error("unsupported pixel layout: {0} channels")]
    UnsupportedChannels(u32),
}

/// Per-frame detector outcomes. Both variants are absorbed locally: the
/// frame is forwarded unannotated.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detector call exceeded {0:?}")]
    Timeout(Duration),

    #[error("detector failed: {0:#}")]
    Failed(anyhow::Error),
}
