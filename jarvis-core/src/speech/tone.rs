//! `ToneSynthesizer`: placeholder text-to-speech that renders one short
//! tone per word, so spoken responses are audible without a voice model.

use std::f32::consts::TAU;

use super::{SpeechSynthesizer, SynthesizedAudio};
use crate::error::{JarvisError, Result};

const TONE_HZ: f32 = 660.0;
const TONE_MS: u32 = 120;
const GAP_MS: u32 = 40;
const AMPLITUDE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    sample_rate: u32,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio> {
        let words = text.split_whitespace().count();
        if words == 0 {
            return Err(JarvisError::Synthesis("nothing to say".into()));
        }

        let tone_len = (self.sample_rate * TONE_MS / 1000) as usize;
        let gap_len = (self.sample_rate * GAP_MS / 1000) as usize;
        let mut samples = Vec::with_capacity(words * (tone_len + gap_len));

        for _ in 0..words {
            samples.extend((0..tone_len).map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                AMPLITUDE * (TAU * TONE_HZ * t).sin()
            }));
            samples.extend(std::iter::repeat(0.0).take(gap_len));
        }

        Ok(SynthesizedAudio {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}
