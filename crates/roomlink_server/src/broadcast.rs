//! Downlink Broadcast Loop
//!
//! A dedicated OS thread pulls mixed frames off the downlink queue, runs
//! the light cleanup chain on the broadcast copy, applies server-side
//! ducking while any browser speaks, and fans the encoded frame out to
//! every connected client.
//!
//! Per-client dispatch uses `try_send`: a slow client loses that frame, a
//! dead channel disconnects the client. Neither stalls the loop, so the
//! remaining clients never see a gap beyond one frame.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use roomlink_core::{Frame, CHANNELS, SAMPLE_RATE};
use roomlink_dsp::{GainRamp, MicPipeline};

use crate::protocol::{encode_frame, frame_to_bytes, ServerEvent};
use crate::state::ServerState;

/// Per-frame step for the downlink ducking factor.
pub const DUCKING_STEP: f32 = 0.08;

/// Downlink queue poll timeout.
const GET_TIMEOUT: Duration = Duration::from_millis(50);

/// Spawn the broadcast thread. It exits when `state.running` goes false.
pub fn spawn_broadcaster(state: Arc<ServerState>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("roomlink-broadcast".into())
        .spawn(move || run(state))
}

fn run(state: Arc<ServerState>) {
    info!("downlink broadcaster started");

    let mut pipeline =
        MicPipeline::new(SAMPLE_RATE as f32).expect("canonical rate always yields a valid filter");
    let mut ducker = GainRamp::new(DUCKING_STEP);

    while state.running.load(Ordering::Relaxed) {
        let Some(frame) = state.q_downlink.get(GET_TIMEOUT) else {
            continue;
        };
        broadcast_frame(&state, frame, &mut pipeline, &mut ducker);
    }

    // Gain state returns to unity on stop
    ducker.reset();
    state.levels.set_downlink_gain(1.0);

    info!("downlink broadcaster stopped");
}

/// Process and dispatch one downlink frame.
pub(crate) fn broadcast_frame(
    state: &ServerState,
    mut frame: Frame,
    pipeline: &mut MicPipeline,
    ducker: &mut GainRamp,
) {
    pipeline.process(&mut frame);

    // Decay counters advance once per broadcast frame
    let any_speaking = state.tick_speakers();

    if state.browser_vad.browser_ducking_enabled {
        ducker.set_target(if any_speaking {
            state.browser_vad.ducking_gain
        } else {
            1.0
        });
        ducker.process(&mut frame);
        state.levels.set_downlink_gain(ducker.current());
    }

    // Raw PCM copy for the /stream WAV endpoint; lagging listeners skip
    let _ = state.pcm_tx.send(frame_to_bytes(&frame));

    // The pipeline runs regardless of listeners; encoding is skipped
    // when nobody is connected
    let peers = state.snapshot_peers();
    if peers.is_empty() {
        return;
    }

    let event = ServerEvent::AudioFromClubdeck {
        audio: encode_frame(&frame),
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
    };
    let Ok(text) = serde_json::to_string(&event) else {
        return;
    };
    let msg = Message::Text(text);

    let mut dead = Vec::new();
    for peer in &peers {
        match peer.tx.try_send(msg.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(client = %peer.id, "slow client - frame dropped");
            }
            Err(TrySendError::Closed(_)) => dead.push(peer.id),
        }
    }
    for id in dead {
        state.unregister(id);
    }
}
