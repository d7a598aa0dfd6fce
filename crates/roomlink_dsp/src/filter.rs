//! Microphone cleanup - one-pole high-pass and RMS noise gate
//!
//! Browser microphones arrive with rumble and idle hiss. Two cheap fixes
//! run on every mic frame (and on the broadcast copy of the downlink):
//!
//! - a one-pole RC high-pass at 100 Hz to strip low-frequency noise,
//! - an RMS noise gate that attenuates frames below the speech floor.
//!
//! The high-pass is a first-order section, so it is expressed as BiQuad
//! coefficients with the second-order terms zeroed:
//! `y[n] = α·y[n-1] + α·(x[n] - x[n-1])` with `α = RC / (RC + dt)`.

use biquad::{Biquad, Coefficients, DirectForm2Transposed};

use crate::error::DspError;
use crate::meter::rms;

/// Gate attenuation applied to sub-threshold frames.
const GATE_ATTENUATION: f32 = 0.1;

/// One-pole RC high-pass over interleaved canonical stereo int16.
///
/// Left and right channels keep independent filter state.
pub struct HighPass {
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
}

impl HighPass {
    /// Build a high-pass at `cutoff` Hz for the given sample rate.
    pub fn new(cutoff: f32, sample_rate: f32) -> Result<Self, DspError> {
        if cutoff <= 0.0 || cutoff >= sample_rate / 2.0 {
            return Err(DspError::InvalidCutoff {
                cutoff,
                sample_rate,
            });
        }

        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
        let dt = 1.0 / sample_rate;
        let alpha = rc / (rc + dt);

        let coeffs = Coefficients::<f32> {
            a1: -alpha,
            a2: 0.0,
            b0: alpha,
            b1: -alpha,
            b2: 0.0,
        };

        Ok(Self {
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
        })
    }

    /// Filter an interleaved stereo frame in place.
    ///
    /// # Real-time Safety
    /// No allocations. O(n) where n = frame length.
    #[inline]
    pub fn process(&mut self, frame: &mut [i16]) {
        for pair in frame.chunks_exact_mut(2) {
            let l = self.left.run(f32::from(pair[0]));
            let r = self.right.run(f32::from(pair[1]));
            pair[0] = l.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            pair[1] = r.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        }
    }

    /// Clear delay lines (call when the source changes).
    pub fn reset(&mut self) {
        self.left.reset_state();
        self.right.reset_state();
    }
}

/// RMS noise gate: frames quieter than the threshold are attenuated 10x.
///
/// The gate is memoryless per frame; debouncing lives in the VAD, not here.
pub struct NoiseGate {
    threshold: f32,
}

impl NoiseGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Attenuate the frame in place when it meters below the threshold.
    #[inline]
    pub fn process(&self, frame: &mut [i16]) {
        if rms(frame) >= self.threshold {
            return;
        }

        for sample in frame.iter_mut() {
            *sample = (f32::from(*sample) * GATE_ATTENUATION) as i16;
        }
    }
}

/// The mic cleanup chain: high-pass then noise gate.
///
/// One instance per audio source (each browser connection gets its own,
/// the broadcaster keeps another for the downlink copy).
pub struct MicPipeline {
    highpass: HighPass,
    gate: NoiseGate,
}

impl MicPipeline {
    /// Build the standard chain: 100 Hz high-pass, 150 RMS gate.
    pub fn new(sample_rate: f32) -> Result<Self, DspError> {
        Ok(Self {
            highpass: HighPass::new(100.0, sample_rate)?,
            gate: NoiseGate::new(150.0),
        })
    }

    /// Run the chain over an interleaved stereo frame in place.
    #[inline]
    pub fn process(&mut self, frame: &mut [i16]) {
        self.highpass.process(frame);
        self.gate.process(frame);
    }

    /// Clear filter state.
    pub fn reset(&mut self) {
        self.highpass.reset();
    }
}
