//! Voice Activity Detection - RMS threshold with debounced transitions
//!
//! The detector watches a stream of canonical int16 frames and reports
//! whether somebody is speaking. A plain RMS threshold flickers badly on
//! real speech, so both edges are debounced: activation requires
//! `min_duration` of consecutive loud frames, release requires
//! `release_time` of consecutive quiet frames.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::meter::rms;

/// VAD tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS threshold in int16 units (0 - 32768).
    pub threshold: f32,

    /// Seconds of continuous speech before the detector activates.
    pub min_duration: f32,

    /// Seconds of continuous silence before the detector releases.
    pub release_time: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 150.0,
            min_duration: 0.1,
            release_time: 0.5,
        }
    }
}

/// Debounced RMS voice-activity detector.
///
/// One instance per monitored source. `detect` is called once per frame
/// and returns the current speech state; no allocation, no locking.
pub struct VoiceActivityDetector {
    config: VadConfig,

    is_active: bool,
    active_frames: u32,
    silent_frames: u32,

    /// Consecutive loud frames required to activate.
    activation_frames: u32,
    /// Consecutive quiet frames required to release.
    release_frames: u32,
}

/// Snapshot of detector state, surfaced through `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct VadStatus {
    pub active: bool,
    pub active_frames: u32,
    pub silent_frames: u32,
    pub threshold: f32,
}

impl VoiceActivityDetector {
    /// Create a detector for frames of `chunk_frames` frames at `sample_rate`.
    pub fn new(config: VadConfig, sample_rate: u32, chunk_frames: u32) -> Self {
        let frames_for = |seconds: f32| -> u32 {
            let n = (seconds * sample_rate as f32 / chunk_frames as f32) as u32;
            n.max(1)
        };

        let activation_frames = frames_for(config.min_duration);
        let release_frames = frames_for(config.release_time);

        debug!(
            threshold = config.threshold,
            activation_frames, release_frames, "VAD initialized"
        );

        Self {
            config,
            is_active: false,
            active_frames: 0,
            silent_frames: 0,
            activation_frames,
            release_frames,
        }
    }

    /// Feed one frame and return the (possibly updated) speech state.
    pub fn detect(&mut self, frame: &[i16]) -> bool {
        let level = rms(frame);

        if level > self.config.threshold {
            self.active_frames += 1;
            self.silent_frames = 0;

            if !self.is_active && self.active_frames >= self.activation_frames {
                self.is_active = true;
                debug!(rms = level, "VAD: speech detected");
            }
        } else {
            self.silent_frames += 1;
            self.active_frames = 0;

            if self.is_active && self.silent_frames >= self.release_frames {
                self.is_active = false;
                debug!("VAD: speech ended");
            }
        }

        self.is_active
    }

    /// Whether the detector currently reports speech.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Snapshot of the detector state for diagnostics.
    pub fn status(&self) -> VadStatus {
        VadStatus {
            active: self.is_active,
            active_frames: self.active_frames,
            silent_frames: self.silent_frames,
            threshold: self.config.threshold,
        }
    }

    /// Clear all state and return to idle.
    pub fn reset(&mut self) {
        self.is_active = false;
        self.active_frames = 0;
        self.silent_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48_000;
    const CHUNK_FRAMES: u32 = 512;

    fn loud_frame() -> Vec<i16> {
        vec![3000i16; 1024]
    }

    fn quiet_frame() -> Vec<i16> {
        vec![0i16; 1024]
    }

    #[test]
    fn test_default_thresholds_in_frames() {
        // 0.1s at 48kHz / 512 frames-per-chunk = 9 chunks, 0.5s = 46 chunks
        let vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);
        assert_eq!(vad.activation_frames, 9);
        assert_eq!(vad.release_frames, 46);
    }

    #[test]
    fn test_starts_idle() {
        let vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);
        assert!(!vad.is_active());
    }

    #[test]
    fn test_no_activation_before_min_duration() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);

        // 8 loud frames: one short of the 9-frame activation threshold
        for _ in 0..8 {
            assert!(!vad.detect(&loud_frame()));
        }
        assert!(vad.detect(&loud_frame()), "9th loud frame should activate");
    }

    #[test]
    fn test_release_requires_sustained_silence() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);

        for _ in 0..9 {
            vad.detect(&loud_frame());
        }
        assert!(vad.is_active());

        // 45 quiet frames: one short of the 46-frame release threshold
        for _ in 0..45 {
            assert!(vad.detect(&quiet_frame()));
        }
        assert!(!vad.detect(&quiet_frame()), "46th quiet frame should release");
    }

    #[test]
    fn test_brief_silence_resets_activation_count() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);

        for _ in 0..8 {
            vad.detect(&loud_frame());
        }
        // One quiet frame zeroes the consecutive-loud counter
        vad.detect(&quiet_frame());

        for _ in 0..8 {
            assert!(!vad.detect(&loud_frame()));
        }
    }

    #[test]
    fn test_brief_speech_does_not_release() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);

        for _ in 0..9 {
            vad.detect(&loud_frame());
        }

        // Silence interrupted by a loud frame never accumulates to release
        for _ in 0..3 {
            for _ in 0..40 {
                vad.detect(&quiet_frame());
            }
            vad.detect(&loud_frame());
        }
        assert!(vad.is_active());
    }

    #[test]
    fn test_reset() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);
        for _ in 0..20 {
            vad.detect(&loud_frame());
        }
        assert!(vad.is_active());

        vad.reset();
        assert!(!vad.is_active());
        assert_eq!(vad.status().active_frames, 0);
    }

    #[test]
    fn test_status_snapshot() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default(), SAMPLE_RATE, CHUNK_FRAMES);
        vad.detect(&loud_frame());
        vad.detect(&loud_frame());

        let status = vad.status();
        assert!(!status.active);
        assert_eq!(status.active_frames, 2);
        assert_eq!(status.threshold, 150.0);
    }

    #[test]
    fn test_sub_chunk_durations_round_up_to_one_frame() {
        let config = VadConfig {
            min_duration: 0.001,
            ..VadConfig::default()
        };
        let mut vad = VoiceActivityDetector::new(config, SAMPLE_RATE, CHUNK_FRAMES);
        assert!(vad.detect(&loud_frame()), "single frame should activate");
    }
}
