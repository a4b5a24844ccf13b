//! Energy-based wake detector using an RMS threshold, a minimum loud run and
//! re-arming on silence.
//!
//! ## Algorithm
//!
//! 1. Compute the normalised RMS of the incoming frame.
//! 2. While armed, count consecutive frames with RMS ≥ `threshold`.
//! 3. When the run reaches `min_active_frames` → report keyword 0 and disarm.
//! 4. Re-arm only after `rearm_quiet_frames` consecutive quiet frames, so one
//!    long utterance triggers once.
//!
//! It cannot tell phrases apart; it stands in for a real keyword spotter.

use super::WakeWordDetector;
use crate::buffering::Frame;
use crate::error::Result;

/// Samples per frame, matching common keyword-spotter constants.
pub const FRAME_LENGTH: usize = 512;

/// Required sample rate (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone)]
pub struct EnergyWakeDetector {
    /// Normalised RMS in [0, 1] above which a frame counts as loud.
    threshold: f32,
    /// Loud frames in a row needed to fire (≈ 32 ms each).
    min_active_frames: u32,
    /// Quiet frames in a row needed before firing again.
    rearm_quiet_frames: u32,
    active_run: u32,
    quiet_run: u32,
    armed: bool,
}

impl EnergyWakeDetector {
    pub fn new(threshold: f32, min_active_frames: u32, rearm_quiet_frames: u32) -> Self {
        Self {
            threshold,
            min_active_frames: min_active_frames.max(1),
            rearm_quiet_frames,
            active_run: 0,
            quiet_run: 0,
            armed: true,
        }
    }

    /// Map a keyword-spotter sensitivity in [0, 1] to an RMS threshold:
    /// 1.0 → 0.02, 0.0 → 0.12.
    pub fn with_sensitivity(sensitivity: f32) -> Self {
        let s = sensitivity.clamp(0.0, 1.0);
        Self::new(0.02 + (1.0 - s) * 0.10, 8, 16)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples
            .iter()
            .map(|&s| {
                let x = f32::from(s) / 32768.0;
                x * x
            })
            .sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyWakeDetector {
    fn default() -> Self {
        Self::with_sensitivity(0.7)
    }
}

impl WakeWordDetector for EnergyWakeDetector {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn process(&mut self, frame: &Frame) -> Result<Option<usize>> {
        let loud = Self::rms(frame.samples()) >= self.threshold;

        if loud {
            self.quiet_run = 0;
            self.active_run = self.active_run.saturating_add(1);
        } else {
            self.active_run = 0;
            self.quiet_run = self.quiet_run.saturating_add(1);
            if self.quiet_run >= self.rearm_quiet_frames {
                self.armed = true;
            }
        }

        if self.armed && self.active_run >= self.min_active_frames {
            self.armed = false;
            return Ok(Some(0));
        }
        Ok(None)
    }
}
