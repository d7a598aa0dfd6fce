//! WebSocket Connection Handling
//!
//! One task pair per browser: a send task draining the peer's outbound
//! channel, and the intake loop below consuming client events. Mic frames
//! are cleaned up, metered for the server-side ducker, and written into
//! the browser ring.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use roomlink_core::{DuplexMode, SAMPLE_RATE};
use roomlink_dsp::{peak, MicPipeline};

use crate::protocol::{decode_frame, ClientEvent, ServerEvent};
use crate::state::{Peer, ServerState};

/// `GET /ws` - upgrade entry point.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (peer, mut outbound) = state.register();
    info!(client = %peer.id, "browser connected");

    // Greeting carries the config snapshot the client needs to start
    let hello = ServerEvent::Connected {
        client_id: peer.id,
        duplex_mode: state.duplex_mode,
    };
    send_event(&peer, &hello);

    // Send task: outbound channel → socket. Exits when the channel
    // closes (disconnect) or the transport dies.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Each connection keeps its own filter state
    let mut pipeline = match MicPipeline::new(SAMPLE_RATE as f32) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "mic pipeline unavailable - dropping connection");
            state.unregister(peer.id);
            send_task.abort();
            return;
        }
    };

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => handle_event(&text, &peer, &state, &mut pipeline),
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol
            _ => {}
        }
    }

    state.unregister(peer.id);
    send_task.abort();
}

/// Dispatch one client event. Malformed input drops the message, never
/// the connection.
fn handle_event(text: &str, peer: &Arc<Peer>, state: &Arc<ServerState>, pipeline: &mut MicPipeline) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(client = %peer.id, error = %e, "malformed client event dropped");
            return;
        }
    };

    match event {
        ClientEvent::GetConfig => {
            send_event(
                peer,
                &ServerEvent::Config {
                    duplex_mode: state.duplex_mode,
                },
            );
        }

        ClientEvent::AudioData { audio } => {
            if state.duplex_mode == DuplexMode::Half {
                return;
            }

            let mut samples = match decode_frame(&audio) {
                Ok(samples) => samples,
                Err(e) => {
                    debug!(client = %peer.id, error = %e, "bad audio payload dropped");
                    return;
                }
            };

            pipeline.process(&mut samples);

            let loud = f32::from(peak(&samples)) > state.browser_vad.ducking_threshold;
            peer.note_mic_frame(loud);

            state.ring_browser.write(&samples);
        }

        // Routing hints; accepted but not acted on
        ClientEvent::JoinRoom { .. } | ClientEvent::LeaveRoom { .. } => {}
    }
}

/// Queue an event for one peer; a full buffer drops the event.
fn send_event(peer: &Arc<Peer>, event: &ServerEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = peer.tx.try_send(Message::Text(text));
    }
}
