// ============================================================================
// Frame framing tests
// ============================================================================

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::FrameDecoder;
use crate::error::CaptureError;
use crate::frame::FrameShape;

const SHAPE: FrameShape = FrameShape {
    width: 4,
    height: 2,
    channels: 3,
};

fn stream_of(frames: usize, extra: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(frames * SHAPE.frame_size() + extra);
    for i in 0..frames * SHAPE.frame_size() + extra {
        data.push((i % 251) as u8);
    }
    data
}

// ------------------------------------------------------------------------
// Exact multiples
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_exact_multiple_yields_exact_frames() {
    let data = stream_of(3, 0);
    let mut decoder = FrameDecoder::new(data.as_slice(), SHAPE);

    for expected_seq in 1..=3u64 {
        let frame = decoder.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.data.len(), SHAPE.frame_size());
        assert_eq!(frame.sequence, expected_seq);
        assert_eq!(frame.shape, SHAPE);
    }

    assert!(decoder.next_frame().await.unwrap().is_none());
    assert_eq!(decoder.frames_decoded(), 3);
}

#[tokio::test]
async fn test_empty_stream_is_clean_eof() {
    let mut decoder = FrameDecoder::new(&[][..], SHAPE);
    assert!(decoder.next_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn test_frame_payload_preserved() {
    let data = stream_of(1, 0);
    let mut decoder = FrameDecoder::new(data.as_slice(), SHAPE);

    let frame = decoder.next_frame().await.unwrap().unwrap();
    assert_eq!(&frame.data[..], &data[..]);
}

// ------------------------------------------------------------------------
// Truncation
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_trailing_short_chunk_is_truncation() {
    let data = stream_of(2, 5);
    let mut decoder = FrameDecoder::new(data.as_slice(), SHAPE);

    assert!(decoder.next_frame().await.unwrap().is_some());
    assert!(decoder.next_frame().await.unwrap().is_some());

    match decoder.next_frame().await {
        Err(CaptureError::TruncatedFrame { expected, got }) => {
            assert_eq!(expected, SHAPE.frame_size());
            assert_eq!(got, 5);
        }
        other => panic!("expected TruncatedFrame, got {:?}", other.map(|f| f.is_some())),
    }

    // the sequence stays terminated afterwards
    assert!(decoder.next_frame().await.unwrap().is_none());
    assert_eq!(decoder.frames_decoded(), 2);
}

#[tokio::test]
async fn test_short_only_stream_is_truncation() {
    let data = stream_of(0, 1);
    let mut decoder = FrameDecoder::new(data.as_slice(), SHAPE);

    match decoder.next_frame().await {
        Err(CaptureError::TruncatedFrame { got, .. }) => assert_eq!(got, 1),
        other => panic!("expected TruncatedFrame, got {:?}", other.map(|f| f.is_some())),
    }
}

// ------------------------------------------------------------------------
// Partial reads
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_frame_assembled_from_chunked_reads() {
    let (mut writer, reader) = tokio::io::duplex(8);
    let mut decoder = FrameDecoder::new(reader, SHAPE);

    let data = stream_of(1, 0);
    let feed = tokio::spawn(async move {
        for chunk in data.chunks(5) {
            writer.write_all(chunk).await.unwrap();
        }
        drop(writer);
    });

    let frame = decoder.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.data.len(), SHAPE.frame_size());
    assert!(decoder.next_frame().await.unwrap().is_none());
    feed.await.unwrap();
}

// ------------------------------------------------------------------------
// Stream adapter
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_into_stream_terminates_at_eof() {
    let data = stream_of(2, 0);
    let frames: Vec<_> = FrameDecoder::new(data.as_slice(), SHAPE)
        .into_stream()
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.is_ok()));
}

#[tokio::test]
async fn test_into_stream_ends_after_truncation() {
    let data = stream_of(1, 3);
    let frames: Vec<_> = FrameDecoder::new(data.as_slice(), SHAPE)
        .into_stream()
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_ok());
    assert!(frames[1].is_err());
}
