use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;

use crate::error::CaptureError;
use crate::frame::FrameShape;

/// One stage of the subprocess chain.
#[derive(Clone, Debug)]
struct CommandSpec {
    program: String,
    args: Vec<String>,
}

/// Capture parameters plus the two commands making up the chain.
#[derive(Clone, Debug)]
pub struct CaptureSpec {
    pub shape: FrameShape,
    pub frame_rate: u32,
    pub grace: Duration,
    capture: CommandSpec,
    converter: CommandSpec,
}

impl CaptureSpec {
    /// Default chain: `libcamera-vid` producing a raw YUV stream on stdout,
    /// piped into `ffmpeg` converting it to the fixed interleaved layout.
    pub fn new(shape: FrameShape, frame_rate: u32, grace: Duration) -> Self {
        let capture = CommandSpec {
            program: "libcamera-vid".to_string(),
            args: vec![
                "-t".into(),
                "0".into(),
                "--width".into(),
                shape.width.to_string(),
                "--height".into(),
                shape.height.to_string(),
                "--framerate".into(),
                frame_rate.to_string(),
                "--codec".into(),
                "yuv420".into(),
                "--nopreview".into(),
                "-o".into(),
                "-".into(),
            ],
        };
        let converter = CommandSpec {
            program: "ffmpeg".to_string(),
            args: vec![
                "-hide_banner".into(),
                "-loglevel".into(),
                "error".into(),
                "-f".into(),
                "rawvideo".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-video_size".into(),
                format!("{}x{}", shape.width, shape.height),
                "-framerate".into(),
                frame_rate.to_string(),
                "-i".into(),
                "-".into(),
                "-f".into(),
                "rawvideo".into(),
                "-pix_fmt".into(),
                pixel_format(shape.channels).into(),
                "-".into(),
            ],
        };
        Self {
            shape,
            frame_rate,
            grace,
            capture,
            converter,
        }
    }

    /// Replace both commands; test hook for driving the chain with shell
    /// stand-ins instead of the camera binaries.
    pub(crate) fn with_commands(
        mut self,
        capture: (&str, &[&str]),
        converter: (&str, &[&str]),
    ) -> Self {
        self.capture = CommandSpec {
            program: capture.0.to_string(),
            args: capture.1.iter().map(|a| a.to_string()).collect(),
        };
        self.converter = CommandSpec {
            program: converter.0.to_string(),
            args: converter.1.iter().map(|a| a.to_string()).collect(),
        };
        self
    }
}

fn pixel_format(channels: u32) -> &'static str {
    match channels {
        1 => "gray",
        4 => "rgba",
        _ => "rgb24",
    }
}

/// Running capture chain. The converter's stdout carries the raw frame
/// stream; both children are killed on drop so no exit path leaks them.
pub struct CameraSource {
    capture: Child,
    converter: Child,
    reader: Option<ChildStdout>,
    grace: Duration,
}

impl CameraSource {
    pub fn start(spec: &CaptureSpec) -> Result<Self, CaptureError> {
        let mut capture = Command::new(&spec.capture.program)
            .args(&spec.capture.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                stage: "capture",
                command: spec.capture.program.clone(),
                source,
            })?;

        let capture_out = capture.stdout.take().ok_or_else(|| CaptureError::Spawn {
            stage: "capture",
            command: spec.capture.program.clone(),
            source: std::io::Error::other("stdout handle missing"),
        })?;
        let capture_out: Stdio =
            capture_out
                .try_into()
                .map_err(|source| CaptureError::Spawn {
                    stage: "capture",
                    command: spec.capture.program.clone(),
                    source,
                })?;

        let mut converter = Command::new(&spec.converter.program)
            .args(&spec.converter.args)
            .stdin(capture_out)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                stage: "converter",
                command: spec.converter.program.clone(),
                source,
            })?;

        let reader = converter.stdout.take().ok_or_else(|| CaptureError::Spawn {
            stage: "converter",
            command: spec.converter.program.clone(),
            source: std::io::Error::other("stdout handle missing"),
        })?;

        log::info!(
            "capture chain started: {} | {}",
            spec.capture.program,
            spec.converter.program
        );

        Ok(Self {
            capture,
            converter,
            reader: Some(reader),
            grace: spec.grace,
        })
    }

    /// Take the frame stream. Yields `None` on the second call.
    pub fn reader(&mut self) -> Option<ChildStdout> {
        self.reader.take()
    }

    /// Terminate both children: SIGTERM first, SIGKILL once the grace period
    /// elapses. Always returns within roughly twice the grace period.
    pub async fn stop(mut self) {
        terminate(&self.capture);
        terminate(&self.converter);

        for (name, child) in [
            ("capture", &mut self.capture),
            ("converter", &mut self.converter),
        ] {
            match timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!("{} process exited: {}", name, status);
                }
                Ok(Err(err)) => {
                    log::warn!("{} process wait failed: {}", name, err);
                }
                Err(_) => {
                    log::warn!("{} process ignored SIGTERM, killing", name);
                    if let Err(err) = child.kill().await {
                        log::error!("failed to kill {} process: {}", name, err);
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
