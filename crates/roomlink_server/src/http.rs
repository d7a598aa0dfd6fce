//! HTTP Surface
//!
//! Minimal status endpoints, the WebSocket upgrade path, and the endless
//! WAV stream used by clients that cannot keep a WebSocket alive in the
//! background (iOS Safari). All handlers are thin reads over the shared
//! state.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use roomlink_core::{CHANNELS, SAMPLE_RATE};

use crate::state::ServerState;
use crate::ws::ws_handler;

/// Keep-alive cadence for `/stream`: silence is sent after this long
/// without a downlink frame.
const STREAM_KEEPALIVE: Duration = Duration::from_millis(500);

/// Silence payload per keep-alive tick (int16 stereo).
const SILENCE_BYTES: usize = 1024 * CHANNELS as usize * 2;

/// Build the router with all routes and the configured CORS policy.
pub fn router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/sdk-info", get(sdk_info))
        .route("/stream", get(stream_audio))
        .route("/ws", get(ws_handler))
        .fallback(not_found);

    if state.cors.enabled {
        let origins: Vec<HeaderValue> = state
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        // An empty allow-list rejects every cross-origin caller
        router = router.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// The browser client bundle is deployed separately; this page only
/// confirms the bridge is up.
async fn index() -> Html<&'static str> {
    Html("<!doctype html><title>roomlink</title><p>roomlink audio bridge - connect via /ws</p>")
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let (clubdeck_rms, music_rms) = state.levels.input_levels();

    Json(json!({
        "status": "running",
        "peers": state.peer_count(),
        "vad": state.levels.vad(),
        "levels": {
            "clubdeck_rms": clubdeck_rms,
            "music_rms": music_rms,
            "downlink_gain": state.levels.downlink_gain(),
        },
        "drops": {
            "downlink_queue": state.q_downlink.drops(),
            "browser_ring_overwrites": state.ring_browser.overwrites(),
        },
    }))
}

async fn sdk_info(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let host = &state.server_config.host;
    let port = state.server_config.port;

    Json(json!({
        "name": "Roomlink",
        "version": env!("CARGO_PKG_VERSION"),
        "server_url": format!("http://{host}:{port}"),
        "websocket_url": format!("ws://{host}:{port}/ws"),
        "duplex_mode": state.duplex_mode,
        "audio_format": {
            "sample_rate": SAMPLE_RATE,
            "channels": CHANNELS,
            "encoding": "int16_base64",
        },
        "features": ["listen_only", "volume_control", "real_time_audio"],
    }))
}

/// `GET /stream` - endless chunked WAV of the downlink mix.
///
/// The header announces a ~2 GB body so renderers treat it as a file;
/// the connection ends long before that. Starvation is bridged with
/// silence to keep the transport alive.
async fn stream_audio(State(state): State<Arc<ServerState>>) -> Response {
    let rx = state.pcm_tx.subscribe();

    let header_chunk = wav_header(SAMPLE_RATE, CHANNELS, 16);
    let head = futures_util::stream::once(async move { Ok::<_, Infallible>(header_chunk) });

    let live = futures_util::stream::unfold(rx, |mut rx| async move {
        let chunk = match tokio::time::timeout(STREAM_KEEPALIVE, rx.recv()).await {
            Ok(Ok(bytes)) => bytes,
            // Fell behind the fan-out: skip ahead, the next frame catches up
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => Vec::new(),
            Ok(Err(broadcast::error::RecvError::Closed)) => return None,
            Err(_starved) => vec![0u8; SILENCE_BYTES],
        };
        Some((Ok::<_, Infallible>(chunk), rx))
    });

    let mut response = Body::from_stream(head.chain(live)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// WAV header for an endless PCM stream (data size pinned near 2 GB).
fn wav_header(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_size: u32 = 0x7FFF_FFFF;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(data_size + 36).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&bits_per_sample.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());
    header
}

/// Friendly 404 for everything else.
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Resource not found" })))
}
