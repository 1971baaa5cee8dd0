use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::{Bytes, BytesMut};
use camera_bus::frame::EncodedFrame;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::models;
use crate::supervisor::{CounterSnapshot, PipelineState, Supervisor};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: StreamConfig,
    pub(crate) supervisor: Arc<Supervisor>,
}

pub(crate) fn start_api_server(state: AppState, cancel: CancellationToken) {
    tokio::spawn(async move {
        let addr = state.config.bind_addr.clone();
        let app = router(state);

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(err) => {
                log::error!("failed to bind {}: {}", addr, err);
                cancel.cancel();
                return;
            }
        };
        log::info!("API server started on {}", addr);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("API server error: {}", e);
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/detection-stream", get(detection_stream))
        .route("/frame.jpg", get(latest_frame))
        .route("/status", get(status))
        .route("/models/download", get(download_models))
        .with_state(state)
}

async fn index() -> &'static str {
    "camwatch: /detection-stream /frame.jpg /status /models/download"
}

/// Live annotated stream. Commits the multipart content type only once the
/// pipeline has proven it can produce a frame; before that, failures still
/// get a plain 500. Afterwards failure is just connection close — the
/// multipart framing leaves no room for a mid-stream error body.
async fn detection_stream(State(state): State<AppState>) -> Response {
    let mut handle = match state.supervisor.attach().await {
        Ok(handle) => handle,
        Err(err) => {
            log::warn!("stream request rejected: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to start capture: {err:#}"),
            )
                .into_response();
        }
    };

    let write_timeout = state.config.write_timeout;
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(1);
    tokio::spawn(async move {
        while let Some(frame) = handle.next().await {
            let chunk = multipart_chunk(&frame);
            match tokio::time::timeout(write_timeout, tx.send(Ok(chunk))).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    log::debug!("subscriber {} disconnected", handle.id());
                    break;
                }
                Err(_) => {
                    log::debug!(
                        "subscriber {} stalled past {:?}, dropping connection",
                        handle.id(),
                        write_timeout
                    );
                    break;
                }
            }
        }
        // handle drops here and unsubscribes on both exit paths
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Frames are written as one pre-assembled chunk each, so a consumer never
/// sees a partially framed image.
fn multipart_chunk(frame: &EncodedFrame) -> Bytes {
    let mut payload = BytesMut::with_capacity(frame.jpeg.len() + 64);
    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(&frame.jpeg);
    payload.extend_from_slice(b"\r\n\r\n");
    payload.freeze()
}

async fn latest_frame(State(state): State<AppState>) -> Response {
    match state.supervisor.latest_frame() {
        Some(frame) => ([(header::CONTENT_TYPE, "image/jpeg")], frame.jpeg).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no frame captured yet").into_response(),
    }
}

#[derive(Serialize)]
struct StatusResponse {
    state: PipelineState,
    subscribers: usize,
    counters: CounterSnapshot,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.supervisor.state(),
        subscribers: state.supervisor.broadcaster().subscriber_count(),
        counters: state.supervisor.counters(),
    })
}

async fn download_models(State(state): State<AppState>) -> Response {
    match models::download_default_models(&state.config.model_dir).await {
        Ok(files) => Json(serde_json::json!({
            "message": "detector models downloaded",
            "files": files,
        }))
        .into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            format!("model download failed: {err:#}"),
        )
            .into_response(),
    }
}
