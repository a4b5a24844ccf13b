//! Wake-word activation.
//!
//! `WakeWordDetector` is the collaborator seam: swap the built-in
//! [`EnergyWakeDetector`](energy::EnergyWakeDetector) for a vendor keyword
//! spotter without touching the engine. `ActivationDetector` is the thin
//! adapter the engine drives, one frame per call.

pub mod energy;

use tracing::error;

use crate::buffering::Frame;
use crate::engine::EngineConfig;
use crate::error::{JarvisError, Result};
use crate::models::{ModelLoader, Slot};

/// Contract for keyword spotters.
pub trait WakeWordDetector: Send {
    /// Samples per frame the detector requires.
    fn frame_length(&self) -> usize;

    /// Sample rate (Hz) the detector requires.
    fn sample_rate(&self) -> u32;

    /// Feed one frame. Returns the index of the detected keyword, if any.
    fn process(&mut self, frame: &Frame) -> Result<Option<usize>>;
}

/// Forwards frames to the loaded wake-word collaborator.
#[derive(Default)]
pub struct ActivationDetector {
    detector: Slot<Box<dyn WakeWordDetector>>,
}

impl ActivationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_loaded()
    }

    /// Load the collaborator if needed and check it accepts the engine's framing.
    pub fn load(&mut self, loader: &dyn ModelLoader, config: &EngineConfig) -> Result<()> {
        let detector = self.detector.ensure_loaded(|| loader.load_wake_word())?;
        if detector.frame_length() != config.frame_length
            || detector.sample_rate() != config.sample_rate
        {
            let msg = format!(
                "detector expects {} samples @ {} Hz, engine delivers {} @ {} Hz",
                detector.frame_length(),
                detector.sample_rate(),
                config.frame_length,
                config.sample_rate
            );
            self.detector.unload();
            return Err(JarvisError::WakeWord(msg));
        }
        Ok(())
    }

    pub fn unload(&mut self) {
        self.detector.unload();
    }

    /// Whether `frame` completes a wake phrase. Detector errors count as no.
    pub fn check(&mut self, frame: &Frame) -> bool {
        let Some(detector) = self.detector.get_mut() else {
            return false;
        };
        match detector.process(frame) {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                error!("activation check failed: {e}");
                false
            }
        }
    }
}
