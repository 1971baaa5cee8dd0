//! Capture session supervision.
//!
//! Data flow:
//! ```text
//! capture proc ─► converter proc ─► FrameDecoder ─► detector ─► JPEG encode
//!                                                                    │
//!                                              Broadcaster ◄─────────┘
//!                                                   │
//!                                  [subscriber queues, latest-frame-wins]
//! ```
//!
//! One worker task drives the chain sequentially; detection and encoding run
//! on the blocking pool but the worker awaits each stage, so at most one
//! frame is in flight and memory stays bounded. Only frame-source failures
//! end the session; everything else degrades frame-by-frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Result, anyhow};
use camera_bus::decoder::FrameDecoder;
use camera_bus::detect::{Detector, build_detector, detect_with_timeout};
use camera_bus::encode::JpegFrameEncoder;
use camera_bus::error::{CaptureError, DetectorError};
use camera_bus::frame::{self, EncodedFrame};
use camera_bus::source::{CameraSource, CaptureSpec};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Broadcaster, SubscriberHandle};
use crate::config::StreamConfig;

/// Lifecycle of the subprocess chain, published over a watch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Degraded,
    Stopping,
}

/// What to do when the raw stream misaligns. There is no marker to scan for
/// in raw pixel data, so "resync" means respawning the source chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationPolicy {
    EndSession,
    RestartSource,
}

const MAX_SOURCE_RESTARTS: u32 = 3;

/// Why a pump run ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    EndOfStream,
    Truncated,
    SourceError,
    Cancelled,
    Idle,
}

#[derive(Default)]
pub struct PipelineCounters {
    frames_published: AtomicU64,
    detector_failures: AtomicU64,
    detector_timeouts: AtomicU64,
    encode_failures: AtomicU64,
    source_restarts: AtomicU64,
}

#[derive(Serialize)]
pub struct CounterSnapshot {
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub detector_failures: u64,
    pub detector_timeouts: u64,
    pub encode_failures: u64,
    pub source_restarts: u64,
}

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the capture session: starts the subprocess chain on demand, drives
/// the frame loop, and guarantees teardown on every exit path.
pub struct Supervisor {
    config: StreamConfig,
    broadcaster: Arc<Broadcaster>,
    state_tx: watch::Sender<PipelineState>,
    counters: PipelineCounters,
    latest: Mutex<Option<EncodedFrame>>,
    last_error: Mutex<Option<String>>,
    session: tokio::sync::Mutex<Option<SessionHandle>>,
}

impl Supervisor {
    pub fn new(config: StreamConfig) -> Arc<Self> {
        let broadcaster = Broadcaster::new(config.queue_depth);
        let (state_tx, _) = watch::channel(PipelineState::Stopped);
        Arc::new(Self {
            config,
            broadcaster,
            state_tx,
            counters: PipelineCounters::default(),
            latest: Mutex::new(None),
            last_error: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
        })
    }

    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Most recent encoded frame, if the session has produced one.
    pub fn latest_frame(&self) -> Option<EncodedFrame> {
        self.latest.lock().unwrap().clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames_published: self.counters.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.broadcaster.frames_dropped(),
            detector_failures: self.counters.detector_failures.load(Ordering::Relaxed),
            detector_timeouts: self.counters.detector_timeouts.load(Ordering::Relaxed),
            encode_failures: self.counters.encode_failures.load(Ordering::Relaxed),
            source_restarts: self.counters.source_restarts.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: PipelineState) {
        if self.state_tx.send_replace(state) != state {
            log::info!("pipeline state: {:?}", state);
        }
    }

    fn record_error(&self, message: String) {
        log::error!("{}", message);
        *self.last_error.lock().unwrap() = Some(message);
    }

    /// Start a session unless one is already live.
    pub async fn ensure_started(self: &Arc<Self>) {
        let mut session = self.session.lock().await;
        let alive = session
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false);
        if alive {
            return;
        }

        *self.last_error.lock().unwrap() = None;
        self.set_state(PipelineState::Starting);

        let cancel = CancellationToken::new();
        let supervisor = Arc::clone(self);
        let session_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            supervisor.run_session(session_cancel).await;
        });
        *session = Some(SessionHandle { cancel, task });
    }

    /// Start (if needed), wait for the first decoded frame, and subscribe.
    ///
    /// Fails when the chain cannot produce its first frame within the start
    /// timeout — the caller has not sent any response bytes yet at that
    /// point, so it can still surface an error status.
    pub async fn attach(self: &Arc<Self>) -> Result<SubscriberHandle> {
        // the first round may catch a previous session mid-teardown, in
        // which case a fresh start is attempted once
        let mut last_round = false;
        loop {
            self.ensure_started().await;

            let mut state_rx = self.state_tx.subscribe();
            let wait = async {
                loop {
                    match *state_rx.borrow_and_update() {
                        PipelineState::Running | PipelineState::Degraded => return Ok(()),
                        PipelineState::Stopped => {
                            let detail = self
                                .last_error
                                .lock()
                                .unwrap()
                                .clone()
                                .unwrap_or_else(|| "capture session ended".to_string());
                            return Err(anyhow!(detail));
                        }
                        PipelineState::Starting | PipelineState::Stopping => {}
                    }
                    if state_rx.changed().await.is_err() {
                        return Err(anyhow!("supervisor gone"));
                    }
                }
            };

            match timeout(self.config.start_timeout, wait).await {
                Ok(Ok(())) => return Ok(self.broadcaster.subscribe()),
                Ok(Err(err)) if last_round => return Err(err),
                Ok(Err(_)) => last_round = true,
                Err(_) => {
                    return Err(anyhow!(
                        "no frame within {:?} of session start",
                        self.config.start_timeout
                    ));
                }
            }
        }
    }

    /// Cancel the live session and wait for teardown, bounded by the grace
    /// period.
    pub async fn shutdown(&self) {
        let handle = self.session.lock().await.take();
        if let Some(SessionHandle { cancel, task }) = handle {
            cancel.cancel();
            let budget = self.config.process_grace * 2;
            if timeout(budget, task).await.is_err() {
                log::error!("session teardown exceeded {:?}", budget);
            }
        }
    }

    async fn run_session(self: &Arc<Self>, cancel: CancellationToken) {
        let detector = match build_detector(&self.config.detector, self.config.detector_confidence)
        {
            Ok(detector) => detector,
            Err(err) => {
                self.record_error(format!("detector init failed: {err:#}"));
                self.set_state(PipelineState::Stopped);
                return;
            }
        };
        let encoder = JpegFrameEncoder::new(self.config.jpeg_quality);
        let spec = CaptureSpec::new(
            self.config.shape(),
            self.config.frame_rate,
            self.config.process_grace,
        );

        let mut restarts = 0u32;
        loop {
            let mut source = match CameraSource::start(&spec) {
                Ok(source) => source,
                Err(err) => {
                    self.record_error(format!("capture chain failed to start: {err}"));
                    break;
                }
            };
            let Some(reader) = source.reader() else {
                self.record_error("converter stream unavailable".to_string());
                source.stop().await;
                break;
            };

            let decoder = FrameDecoder::new(reader, self.config.shape());
            let end = self
                .pump(decoder, Arc::clone(&detector), encoder, &cancel)
                .await;

            self.set_state(PipelineState::Stopping);
            source.stop().await;

            match end {
                SessionEnd::Truncated
                    if self.config.truncation_policy == TruncationPolicy::RestartSource
                        && restarts < MAX_SOURCE_RESTARTS =>
                {
                    restarts += 1;
                    self.counters.source_restarts.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "restarting capture chain after truncation (attempt {}/{})",
                        restarts,
                        MAX_SOURCE_RESTARTS
                    );
                    self.set_state(PipelineState::Starting);
                    continue;
                }
                _ => break,
            }
        }

        self.broadcaster.close_all();
        self.set_state(PipelineState::Stopped);
    }

    /// Drive decode → detect → encode → publish until the stream ends, the
    /// session is cancelled, or the subscribers have been gone long enough.
    pub(crate) async fn pump<R: AsyncRead + Unpin>(
        &self,
        mut decoder: FrameDecoder<R>,
        detector: Arc<dyn Detector>,
        encoder: JpegFrameEncoder,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut degraded = false;
        let mut idle_since: Option<Instant> = None;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = decoder.next_frame() => next,
            };

            let raw = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!(
                        "capture stream ended after {} frames",
                        decoder.frames_decoded()
                    );
                    return SessionEnd::EndOfStream;
                }
                Err(err @ CaptureError::TruncatedFrame { .. }) => {
                    self.record_error(format!("{err}"));
                    return SessionEnd::Truncated;
                }
                Err(err) => {
                    self.record_error(format!("capture read failed: {err}"));
                    return SessionEnd::SourceError;
                }
            };

            if raw.sequence == 1 {
                self.set_state(PipelineState::Running);
            }

            let overlays = match detect_with_timeout(
                Arc::clone(&detector),
                raw.clone(),
                self.config.detector_timeout,
            )
            .await
            {
                Ok(overlays) => {
                    if degraded {
                        degraded = false;
                        self.set_state(PipelineState::Running);
                    }
                    overlays
                }
                Err(err) => {
                    match err {
                        DetectorError::Timeout(_) => {
                            self.counters.detector_timeouts.fetch_add(1, Ordering::Relaxed);
                        }
                        DetectorError::Failed(_) => {
                            self.counters.detector_failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    log::debug!("frame #{} forwarded unannotated: {}", raw.sequence, err);
                    if !degraded {
                        degraded = true;
                        self.set_state(PipelineState::Degraded);
                    }
                    Vec::new()
                }
            };

            let shape = raw.shape;
            let sequence = raw.sequence;
            let data = raw.data;
            let encoded = tokio::task::spawn_blocking(move || {
                if overlays.is_empty() {
                    encoder.encode(&data, &shape, sequence)
                } else {
                    let mut pixels = data.to_vec();
                    frame::draw_overlays(&mut pixels, &shape, &overlays);
                    encoder.encode(&pixels, &shape, sequence)
                }
            })
            .await;

            let encoded = match encoded {
                Ok(Ok(frame)) => frame,
                Ok(Err(err)) => {
                    self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("dropping frame #{}: {}", sequence, err);
                    continue;
                }
                Err(err) => {
                    self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("encode task died for frame #{}: {}", sequence, err);
                    continue;
                }
            };

            *self.latest.lock().unwrap() = Some(encoded.clone());
            self.broadcaster.publish(&encoded);
            self.counters.frames_published.fetch_add(1, Ordering::Relaxed);

            if self.broadcaster.subscriber_count() == 0 {
                if self.config.keep_warm {
                    idle_since = None;
                } else {
                    let since = idle_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= self.config.idle_timeout {
                        log::info!("no subscribers for {:?}, stopping", self.config.idle_timeout);
                        return SessionEnd::Idle;
                    }
                }
            } else {
                idle_since = None;
            }
        }
    }
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_test;
