//! `StubRecognizer`: placeholder backend that describes the buffer instead
//! of recognising it.
//!
//! Lets the whole capture → recognise → dispatch path run without a speech
//! model installed. Output is deterministic: `"[stub: <N> samples @ <SR> Hz]"`.

use tracing::debug;

use super::SpeechRecognizer;
use crate::error::Result;

/// Buffers shorter than this (10 ms at 16 kHz) are treated as silence.
const MIN_SAMPLES: usize = 160;

#[derive(Debug, Default)]
pub struct StubRecognizer {
    utterance_count: u32,
}

impl StubRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text this backend returns for a buffer of `samples` at `sample_rate`.
    pub fn canned_text(samples: usize, sample_rate: u32) -> String {
        format!("[stub: {samples} samples @ {sample_rate} Hz]")
    }
}

impl SpeechRecognizer for StubRecognizer {
    fn transcribe(&mut self, samples: &[i16], sample_rate: u32) -> Result<String> {
        if samples.len() < MIN_SAMPLES {
            return Ok(String::new());
        }
        self.utterance_count += 1;
        debug!(utterance = self.utterance_count, "StubRecognizer::transcribe");
        Ok(Self::canned_text(samples.len(), sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_buffer_length_and_rate() {
        let mut rec = StubRecognizer::new();
        let text = rec.transcribe(&vec![0; 20_480], 16_000).unwrap();
        assert_eq!(text, "[stub: 20480 samples @ 16000 Hz]");
    }

    #[test]
    fn too_short_is_empty() {
        let mut rec = StubRecognizer::new();
        assert_eq!(rec.transcribe(&[1, 2, 3], 16_000).unwrap(), "");
    }
}
