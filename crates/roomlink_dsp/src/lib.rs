//! Roomlink DSP - Signal Processing Module
//!
//! This crate provides the signal-processing pieces of the Roomlink bridge:
//! - RMS voice-activity detection with debounced state transitions
//! - A smoothed gain ramp used for server-side ducking
//! - A one-pole high-pass + noise-gate pair for microphone cleanup
//! - Level metering helpers (RMS / peak over int16 frames)
//!
//! # Architecture
//!
//! Everything here operates on canonical int16 frames and follows a strict
//! "no allocation in the processing path" rule. State updates happen between
//! frames, never mid-buffer.

mod ducker;
mod error;
mod filter;
mod meter;
mod vad;

pub use ducker::GainRamp;
pub use error::DspError;
pub use filter::{HighPass, MicPipeline, NoiseGate};
pub use meter::{peak, rms};
pub use vad::{VadConfig, VadStatus, VoiceActivityDetector};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = VadConfig::default();
        let _ramp = GainRamp::new(0.08);
    }
}
