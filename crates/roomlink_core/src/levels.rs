//! Shared Level Telemetry
//!
//! Atomic snapshot state published by the mixer and broadcaster threads
//! and read by the HTTP surface. f32 values are stored as their bit
//! patterns because atomic floats do not exist.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use roomlink_dsp::VadStatus;

/// Levels and control state shared between audio threads and `/status`.
pub struct SharedLevels {
    clubdeck_rms_bits: AtomicU32,
    music_rms_bits: AtomicU32,
    downlink_gain_bits: AtomicU32,
    vad: Mutex<VadStatus>,
}

impl SharedLevels {
    pub fn new() -> Self {
        Self {
            clubdeck_rms_bits: AtomicU32::new(0.0_f32.to_bits()),
            music_rms_bits: AtomicU32::new(0.0_f32.to_bits()),
            downlink_gain_bits: AtomicU32::new(1.0_f32.to_bits()),
            vad: Mutex::new(VadStatus {
                active: false,
                active_frames: 0,
                silent_frames: 0,
                threshold: 0.0,
            }),
        }
    }

    /// Publish per-input RMS (mixer thread).
    pub fn set_input_levels(&self, clubdeck: f32, music: f32) {
        // Relaxed is fine: these are independent telemetry values
        self.clubdeck_rms_bits
            .store(clubdeck.to_bits(), Ordering::Relaxed);
        self.music_rms_bits.store(music.to_bits(), Ordering::Relaxed);
    }

    pub fn input_levels(&self) -> (f32, f32) {
        (
            f32::from_bits(self.clubdeck_rms_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.music_rms_bits.load(Ordering::Relaxed)),
        )
    }

    /// Publish the current downlink ducking gain (broadcaster thread).
    pub fn set_downlink_gain(&self, gain: f32) {
        self.downlink_gain_bits
            .store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn downlink_gain(&self) -> f32 {
        f32::from_bits(self.downlink_gain_bits.load(Ordering::Relaxed))
    }

    /// Publish a room-VAD snapshot (mixer thread).
    pub fn set_vad(&self, status: VadStatus) {
        *self.vad.lock() = status;
    }

    pub fn vad(&self) -> VadStatus {
        self.vad.lock().clone()
    }
}

impl Default for SharedLevels {
    fn default() -> Self {
        Self::new()
    }
}
