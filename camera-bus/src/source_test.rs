// ============================================================================
// Subprocess chain tests (shell stand-ins for the camera binaries)
// ============================================================================

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::Instant;

use super::{CameraSource, CaptureSpec};
use crate::decoder::FrameDecoder;
use crate::error::CaptureError;
use crate::frame::FrameShape;

const SHAPE: FrameShape = FrameShape {
    width: 2,
    height: 2,
    channels: 3,
};

fn spec_with(capture: (&str, &[&str]), converter: (&str, &[&str])) -> CaptureSpec {
    CaptureSpec::new(SHAPE, 15, Duration::from_millis(500)).with_commands(capture, converter)
}

#[tokio::test]
async fn test_spawn_failure_names_stage() {
    let spec = spec_with(("/nonexistent/capture-binary", &[]), ("cat", &[]));

    match CameraSource::start(&spec) {
        Err(CaptureError::Spawn { stage, .. }) => assert_eq!(stage, "capture"),
        other => panic!("expected Spawn error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_chain_streams_frames_to_eof() {
    // 24 bytes = two exact frames through the converter stand-in
    let spec = spec_with(("sh", &["-c", "head -c 24 /dev/zero"]), ("cat", &[]));

    let mut source = CameraSource::start(&spec).unwrap();
    let reader = source.reader().unwrap();
    let mut decoder = FrameDecoder::new(reader, SHAPE);

    assert!(decoder.next_frame().await.unwrap().is_some());
    assert!(decoder.next_frame().await.unwrap().is_some());
    assert!(decoder.next_frame().await.unwrap().is_none());

    source.stop().await;
}

#[tokio::test]
async fn test_reader_taken_once() {
    let spec = spec_with(("sh", &["-c", "sleep 30"]), ("cat", &[]));

    let mut source = CameraSource::start(&spec).unwrap();
    assert!(source.reader().is_some());
    assert!(source.reader().is_none());

    source.stop().await;
}

#[tokio::test]
async fn test_stop_while_read_blocked_returns_within_grace() {
    let spec = spec_with(("sh", &["-c", "sleep 30"]), ("cat", &[]));

    let mut source = CameraSource::start(&spec).unwrap();
    let mut reader = source.reader().unwrap();

    let read_task = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        reader.read(&mut buf).await
    });

    // give the read a moment to block on the live pipe
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    source.stop().await;
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop exceeded the grace budget: {:?}",
        started.elapsed()
    );

    // the blocked read observes EOF once the chain is gone
    let read = read_task.await.unwrap().unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
#[ignore = "requires libcamera-vid and ffmpeg on the host"]
async fn test_default_chain_produces_frames() {
    let spec = CaptureSpec::new(FrameShape::new(640, 480, 3), 15, Duration::from_secs(3));

    let mut source = CameraSource::start(&spec).unwrap();
    let reader = source.reader().unwrap();
    let mut decoder = FrameDecoder::new(reader, FrameShape::new(640, 480, 3));

    let frame = decoder.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.data.len(), 640 * 480 * 3);

    source.stop().await;
}
