//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while building DSP components
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Invalid high-pass cutoff {cutoff} Hz for sample rate {sample_rate} Hz")]
    InvalidCutoff { cutoff: f32, sample_rate: f32 },

    #[error("Invalid gain step {0} - must be in (0, 1]")]
    InvalidGainStep(f32),
}
