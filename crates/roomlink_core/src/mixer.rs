//! Downlink Mixer
//!
//! Dedicated thread combining the Clubdeck room audio with the music
//! capture into the browser-bound stream. Also the home of the room VAD:
//! every Clubdeck frame updates the detector, and the music controller is
//! told to duck whenever the room speaks.
//!
//! Each downlink frame pairs one Clubdeck frame with one music frame
//! picked at the mixer's current moment; there is no sample-accurate
//! alignment across the independent device clocks, and none is promised.
//! Frame order within each source is preserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use roomlink_dsp::{rms, VoiceActivityDetector};

use crate::levels::SharedLevels;
use crate::music::MusicController;
use crate::queue::FrameQueue;
use crate::Frame;

/// Queue poll timeout. A missing input for longer than this produces no
/// downlink frame (no silent-padding path).
const GET_TIMEOUT: Duration = Duration::from_millis(50);

/// Telemetry cadence in mixed frames (~1 s of chunks).
const LEVEL_INTERVAL: u64 = 94;

/// Everything the mixer thread owns.
pub(crate) struct MixerContext {
    pub q_clubdeck: Arc<FrameQueue>,
    pub q_music: Arc<FrameQueue>,
    pub q_downlink: Arc<FrameQueue>,
    pub vad: VoiceActivityDetector,
    pub music: MusicController,
    pub levels: Arc<SharedLevels>,
    pub running: Arc<AtomicBool>,
    pub mix_mode: bool,
}

/// Spawn the mixer thread. It exits when `running` goes false.
pub(crate) fn spawn(ctx: MixerContext) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("roomlink-mixer".into())
        .spawn(move || run(ctx))
}

fn run(mut ctx: MixerContext) {
    info!(mix_mode = ctx.mix_mode, "downlink mixer started");
    let mut frames: u64 = 0;

    while ctx.running.load(Ordering::Relaxed) {
        let Some(clubdeck) = ctx.q_clubdeck.get(GET_TIMEOUT) else {
            continue;
        };

        let (mixed, music_rms) = if ctx.mix_mode {
            let Some(music) = ctx.q_music.get(GET_TIMEOUT) else {
                continue;
            };
            let rms_level = if frames % LEVEL_INTERVAL == 0 {
                rms(&music)
            } else {
                0.0
            };
            (mix_frames(&clubdeck, &music), rms_level)
        } else {
            // Music ignored: the downlink is the room capture as-is
            (clubdeck.clone(), 0.0)
        };

        let speaking = ctx.vad.detect(&clubdeck);
        ctx.music.set_ducking(speaking);

        ctx.q_downlink.put(mixed);

        if frames % LEVEL_INTERVAL == 0 {
            let clubdeck_rms = rms(&clubdeck);
            ctx.levels.set_input_levels(clubdeck_rms, music_rms);
            ctx.levels.set_vad(ctx.vad.status());
            debug!(clubdeck_rms, music_rms, speaking, "downlink levels");
        }
        frames += 1;
    }

    info!("downlink mixer stopped");
}

/// Sample-wise i32 add of two frames, truncated to the shorter one,
/// clipped back to int16.
pub(crate) fn mix_frames(a: &[i16], b: &[i16]) -> Frame {
    let len = a.len().min(b.len());
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let sum = i32::from(a[i]) + i32::from(b[i]);
        out.push(sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
    }
    out
}
