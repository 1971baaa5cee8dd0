use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use camera_bus::frame::FrameShape;

use crate::supervisor::TruncationPolicy;

/// Everything the pipeline and the HTTP surface are allowed to vary on.
///
/// Built once in `main` from `CAMWATCH_*` environment variables over the
/// defaults below, then passed down by value — no process-wide state.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub channels: u32,

    pub detector: String,
    pub detector_confidence: f32,
    pub detector_timeout: Duration,

    pub jpeg_quality: u8,

    pub queue_depth: usize,
    pub write_timeout: Duration,

    pub process_grace: Duration,
    pub start_timeout: Duration,
    pub idle_timeout: Duration,
    pub keep_warm: bool,
    pub eager_start: bool,
    pub truncation_policy: TruncationPolicy,

    pub bind_addr: String,
    pub model_dir: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 15,
            channels: 3,
            detector: "stub".to_string(),
            detector_confidence: 0.5,
            detector_timeout: Duration::from_millis(500),
            jpeg_quality: 80,
            queue_depth: 2,
            write_timeout: Duration::from_secs(5),
            process_grace: Duration::from_secs(3),
            start_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            keep_warm: false,
            eager_start: false,
            truncation_policy: TruncationPolicy::EndSession,
            bind_addr: "0.0.0.0:5000".to_string(),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl StreamConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            width: env_parse("CAMWATCH_WIDTH", defaults.width),
            height: env_parse("CAMWATCH_HEIGHT", defaults.height),
            frame_rate: env_parse("CAMWATCH_FRAME_RATE", defaults.frame_rate),
            channels: env_parse("CAMWATCH_CHANNELS", defaults.channels),
            detector: env_parse("CAMWATCH_DETECTOR", defaults.detector),
            detector_confidence: env_parse(
                "CAMWATCH_DETECTOR_CONFIDENCE",
                defaults.detector_confidence,
            ),
            detector_timeout: env_millis("CAMWATCH_DETECTOR_TIMEOUT_MS", defaults.detector_timeout),
            jpeg_quality: env_parse("CAMWATCH_JPEG_QUALITY", defaults.jpeg_quality),
            queue_depth: env_parse("CAMWATCH_QUEUE_DEPTH", defaults.queue_depth),
            write_timeout: env_millis("CAMWATCH_WRITE_TIMEOUT_MS", defaults.write_timeout),
            process_grace: env_millis("CAMWATCH_PROCESS_GRACE_MS", defaults.process_grace),
            start_timeout: env_millis("CAMWATCH_START_TIMEOUT_MS", defaults.start_timeout),
            idle_timeout: env_millis("CAMWATCH_IDLE_TIMEOUT_MS", defaults.idle_timeout),
            keep_warm: env_parse("CAMWATCH_KEEP_WARM", defaults.keep_warm),
            eager_start: env_parse("CAMWATCH_EAGER_START", defaults.eager_start),
            truncation_policy: match std::env::var("CAMWATCH_TRUNCATION_POLICY").as_deref() {
                Ok("restart-source") => TruncationPolicy::RestartSource,
                Ok("end-session") | Err(_) => defaults.truncation_policy,
                Ok(other) => {
                    log::warn!("unknown truncation policy '{}', using end-session", other);
                    TruncationPolicy::EndSession
                }
            },
            bind_addr: env_parse("CAMWATCH_BIND_ADDR", defaults.bind_addr),
            model_dir: PathBuf::from(env_parse(
                "CAMWATCH_MODEL_DIR",
                defaults.model_dir.display().to_string(),
            )),
        }
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height, self.channels)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparseable {}={}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(key, default.as_millis() as u64))
}
