//! Sample-rate conversion for playback using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Synthesizers render at their own fixed rate (48 kHz for the built-in tone
//! synthesizer) while output devices pick theirs. `RateConverter` bridges that
//! gap on the speaking thread, where allocation is allowed.
//!
//! When input rate == output rate, `RateConverter` is a passthrough and no
//! rubato session is created at all.
//!
//! ## Usage
//!
//! ```ignore
//! let out = resample_buffer(&speech, 48_000, 44_100)?;
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{JarvisError, Result};

/// Input block size used by [`resample_buffer`].
const BLOCK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when input rate == output rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    ratio: f64,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `JarvisError::Playback` if rubato fails to initialise.
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        let ratio = output_rate as f64 / input_rate as f64;
        if input_rate == output_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                ratio,
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| JarvisError::Playback(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::debug!(input_rate, output_rate, chunk_size, "playback resampler ready");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
            ratio,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated until a full `chunk_size` block is available
    /// for rubato. Any remainder is kept for the next call or for `flush()`.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }

            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Zero-pad and convert whatever partial block is still buffered.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return Vec::new();
        }
        let pending = self.input_buf.len();
        self.input_buf.resize(self.chunk_size, 0.0);
        let mut out = self.process(&[]);
        out.truncate((pending as f64 * self.ratio).ceil() as usize);
        out
    }

    /// Returns `true` when input rate == output rate.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert a complete buffer from `input_rate` to `output_rate`.
pub fn resample_buffer(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    let mut rc = RateConverter::new(input_rate, output_rate, BLOCK)?;
    let mut out = rc.process(samples);
    out.extend(rc.flush());
    Ok(out)
}
