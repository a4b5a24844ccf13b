//! Speech output with capture suspension.
//!
//! The microphone and the speaker share a room. If capture kept running while
//! the assistant talks, its own voice would land in the frame queue and could
//! re-trigger the wake word. `SpeechOutput::speak` therefore fixes the order:
//!
//! ```text
//! suspend capture → synthesize → play (blocking) → resume capture
//! ```
//!
//! Resume runs whether synthesis or playback succeeded or not, and only if
//! the suspend actually closed a stream.

pub mod tone;

use tracing::{debug, error};

use crate::audio::AudioOutput;
use crate::error::Result;
use crate::models::{ModelLoader, Slot};

/// Mono f32 speech at a known rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Contract for text-to-speech backends.
pub trait SpeechSynthesizer: Send {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio>;
}

/// The capture side as seen by speech output.
pub trait CaptureGate {
    /// Close the capture stream if it is open. Returns whether it was.
    fn suspend(&mut self) -> bool;

    /// Reopen a stream closed by `suspend`. Failures are handled inside.
    fn resume(&mut self);
}

pub struct SpeechOutput {
    synthesizer: Slot<Box<dyn SpeechSynthesizer>>,
    output: Box<dyn AudioOutput>,
}

impl SpeechOutput {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            synthesizer: Slot::Unloaded,
            output,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.synthesizer.is_loaded()
    }

    pub fn load(&mut self, loader: &dyn ModelLoader) -> Result<()> {
        self.synthesizer.ensure_loaded(|| loader.load_synthesizer())?;
        Ok(())
    }

    pub fn unload(&mut self) {
        self.synthesizer.unload();
    }

    /// Speak `text`, suspending `gate` for the duration. Best effort: errors
    /// are logged, never returned.
    pub fn speak(&mut self, text: &str, output_device: Option<usize>, gate: &mut dyn CaptureGate) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(synthesizer) = self.synthesizer.get_mut() else {
            debug!("speech synthesizer not loaded, skipping speech");
            return;
        };

        let suspended = gate.suspend();

        let outcome = synthesizer.synthesize(text).and_then(|audio| {
            self.output
                .play(&audio.samples, audio.sample_rate, output_device)
        });
        if let Err(e) = outcome {
            error!("speech output failed: {e}");
        }

        if suspended {
            gate.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JarvisError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Gate {
        log: Log,
        open: bool,
    }

    impl CaptureGate for Gate {
        fn suspend(&mut self) -> bool {
            let was_open = self.open;
            if was_open {
                self.log.lock().push("suspend");
                self.open = false;
            }
            was_open
        }

        fn resume(&mut self) {
            self.log.lock().push("resume");
            self.open = true;
        }
    }

    struct Synth {
        log: Log,
        fail: bool,
    }

    impl SpeechSynthesizer for Synth {
        fn synthesize(&mut self, _text: &str) -> Result<SynthesizedAudio> {
            self.log.lock().push("synthesize");
            if self.fail {
                return Err(JarvisError::Synthesis("intentional test failure".into()));
            }
            Ok(SynthesizedAudio {
                samples: vec![0.0; 8],
                sample_rate: 48_000,
            })
        }
    }

    struct Out {
        log: Log,
    }

    impl AudioOutput for Out {
        fn play(&mut self, _s: &[f32], _r: u32, _d: Option<usize>) -> Result<()> {
            self.log.lock().push("play");
            Ok(())
        }
    }

    fn output_with(log: &Log, fail: bool) -> SpeechOutput {
        let mut out = SpeechOutput::new(Box::new(Out {
            log: Arc::clone(log),
        }));
        out.synthesizer = Slot::Loaded(Box::new(Synth {
            log: Arc::clone(log),
            fail,
        }));
        out
    }

    #[test]
    fn suspends_before_synthesis_and_resumes_after_playback() {
        let log: Log = Arc::default();
        let mut out = output_with(&log, false);
        let mut gate = Gate {
            log: Arc::clone(&log),
            open: true,
        };
        out.speak("hello", None, &mut gate);
        assert_eq!(&*log.lock(), &["suspend", "synthesize", "play", "resume"]);
        assert!(gate.open);
    }

    #[test]
    fn resumes_even_when_synthesis_fails() {
        let log: Log = Arc::default();
        let mut out = output_with(&log, true);
        let mut gate = Gate {
            log: Arc::clone(&log),
            open: true,
        };
        out.speak("hello", None, &mut gate);
        assert_eq!(&*log.lock(), &["suspend", "synthesize", "resume"]);
        assert!(gate.open);
    }

    #[test]
    fn closed_gate_is_not_resumed() {
        let log: Log = Arc::default();
        let mut out = output_with(&log, false);
        let mut gate = Gate {
            log: Arc::clone(&log),
            open: false,
        };
        out.speak("hello", None, &mut gate);
        assert_eq!(&*log.lock(), &["synthesize", "play"]);
        assert!(!gate.open);
    }

    #[test]
    fn blank_text_and_unloaded_synth_are_no_ops() {
        let log: Log = Arc::default();
        let mut gate = Gate {
            log: Arc::clone(&log),
            open: true,
        };

        let mut out = output_with(&log, false);
        out.speak("   ", None, &mut gate);

        let mut unloaded = SpeechOutput::new(Box::new(Out {
            log: Arc::clone(&log),
        }));
        unloaded.speak("hello", None, &mut gate);

        assert!(log.lock().is_empty());
        assert!(gate.open);
    }
}
