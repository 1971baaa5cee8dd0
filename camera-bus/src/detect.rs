use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use bytes::Bytes;

use crate::error::DetectorError;
use crate::frame::{GREEN, Overlay, RawFrame};

/// Annotation capability consumed by the pipeline.
///
/// Implementations are long-lived: built once per capture session and invoked
/// for every frame. A failed call affects that frame only — the pipeline
/// forwards the image unannotated. Implementations must treat the pixel
/// buffer as read-only; annotations are returned as overlays and rendered by
/// the pipeline.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, frame: &RawFrame) -> Result<Vec<Overlay>>;
}

/// Build a detector by kind name. The threshold is interpreted by the
/// backend; classifier backends plug in here under their own names.
pub fn build_detector(kind: &str, confidence: f32) -> Result<Arc<dyn Detector>> {
    match kind {
        "stub" => Ok(Arc::new(StubDetector::new(confidence))),
        "none" => Ok(Arc::new(NullDetector)),
        other => Err(anyhow!("unknown detector kind '{other}'")),
    }
}

/// Run one detector call on the blocking pool, bounded by `limit`.
///
/// A timed-out call cannot be interrupted; the orphaned call finishes in the
/// background holding only a cheap reference to the frame bytes.
pub async fn detect_with_timeout(
    detector: Arc<dyn Detector>,
    frame: RawFrame,
    limit: Duration,
) -> Result<Vec<Overlay>, DetectorError> {
    let task = tokio::task::spawn_blocking(move || detector.detect(&frame));
    match tokio::time::timeout(limit, task).await {
        Err(_) => Err(DetectorError::Timeout(limit)),
        Ok(Err(join)) => Err(DetectorError::Failed(anyhow!(
            "detector task aborted: {join}"
        ))),
        Ok(Ok(Ok(overlays))) => Ok(overlays),
        Ok(Ok(Err(err))) => Err(DetectorError::Failed(err)),
    }
}

/// No-op backend: every frame passes through unannotated.
pub struct NullDetector;

impl Detector for NullDetector {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&self, _frame: &RawFrame) -> Result<Vec<Overlay>> {
        Ok(Vec::new())
    }
}

/// Development backend needing no model files: marks the whole frame when
/// the sampled pixel content moved versus the previous frame.
pub struct StubDetector {
    threshold: u32,
    last: Mutex<Option<Bytes>>,
}

// sampling stride over the pixel buffer; keeps the stub cheap at any size
const SAMPLE_STEP: usize = 251;

impl StubDetector {
    pub fn new(confidence: f32) -> Self {
        // higher confidence demands a bigger per-sample delta before firing
        let threshold = (confidence.clamp(0.0, 1.0) * 64.0) as u32;
        Self {
            threshold,
            last: Mutex::new(None),
        }
    }

    fn mean_sample_delta(previous: &[u8], current: &[u8]) -> u32 {
        let mut total = 0u64;
        let mut samples = 0u64;
        let len = previous.len().min(current.len());
        let mut i = 0;
        while i < len {
            total += previous[i].abs_diff(current[i]) as u64;
            samples += 1;
            i += SAMPLE_STEP;
        }
        if samples == 0 {
            return 0;
        }
        (total / samples) as u32
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &RawFrame) -> Result<Vec<Overlay>> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow!("stub detector state poisoned"))?;

        let moved = match last.as_ref() {
            Some(previous) => Self::mean_sample_delta(previous, &frame.data) > self.threshold,
            None => false,
        };
        *last = Some(frame.data.clone());

        if !moved {
            return Ok(Vec::new());
        }
        Ok(vec![Overlay::Rect {
            x: 0,
            y: 0,
            width: frame.shape.width.saturating_sub(1),
            height: frame.shape.height.saturating_sub(1),
            color: GREEN,
            thickness: 2,
        }])
    }
}

#[cfg(test)]
#[path = "detect_test.rs"]
mod detect_test;
