//! Blocking audio playback to an output device.

use crate::error::Result;

/// Sink for synthesized speech.
pub trait AudioOutput: Send {
    /// Play mono f32 `samples` recorded at `sample_rate` on `device_index`
    /// (`None` = default output). Blocks until playback has finished.
    fn play(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        device_index: Option<usize>,
    ) -> Result<()>;
}

/// Extra time allowed past the nominal clip length before giving up.
const PLAYBACK_GRACE_MS: u64 = 500;

/// Plays audio through cpal, resampling to the device's native rate.
#[derive(Debug, Default)]
pub struct CpalPlayback;

impl CpalPlayback {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "audio-cpal")]
impl AudioOutput for CpalPlayback {
    fn play(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        device_index: Option<usize>,
    ) -> Result<()> {
        use std::sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        };
        use std::time::{Duration, Instant};

        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use cpal::SampleFormat;

        use crate::error::JarvisError;

        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = match device_index {
            None => host
                .default_output_device()
                .ok_or(JarvisError::NoOutputDevice)?,
            Some(index) => host
                .devices()
                .map_err(|e| JarvisError::Playback(e.to_string()))?
                .nth(index)
                .ok_or(JarvisError::NoOutputDevice)?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| JarvisError::Playback(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let converted: Arc<[f32]> =
            super::resample::resample_buffer(samples, sample_rate, device_rate)?.into();
        let total = converted.len();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_output_stream::<f32>(
                &device,
                &config,
                Arc::clone(&converted),
                Arc::clone(&position),
                Arc::clone(&finished),
            ),
            SampleFormat::I16 => build_output_stream::<i16>(
                &device,
                &config,
                Arc::clone(&converted),
                Arc::clone(&position),
                Arc::clone(&finished),
            ),
            SampleFormat::U16 => build_output_stream::<u16>(
                &device,
                &config,
                Arc::clone(&converted),
                Arc::clone(&position),
                Arc::clone(&finished),
            ),
            fmt => {
                return Err(JarvisError::Playback(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| JarvisError::Playback(e.to_string()))?;

        let duration_ms = (total as u64 * 1000) / u64::from(device_rate.max(1));
        let timeout = Duration::from_millis(duration_ms + PLAYBACK_GRACE_MS);
        let start = Instant::now();

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!(
                    played = position.load(Ordering::Relaxed),
                    total,
                    "playback timed out"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        tracing::debug!(samples = total, device_rate, "playback complete");
        Ok(())
    }
}

#[cfg(feature = "audio-cpal")]
fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: std::sync::Arc<[f32]>,
    position: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    finished: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    use std::sync::atomic::Ordering;

    use cpal::traits::DeviceTrait;
    use cpal::Sample;

    let channels = config.channels.max(1) as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut pos = position.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let value = if pos < samples.len() {
                        let v = samples[pos];
                        pos += 1;
                        v
                    } else {
                        finished.store(true, Ordering::Release);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = T::from_sample(value);
                    }
                }
                position.store(pos, Ordering::Relaxed);
            },
            |err| tracing::error!("audio playback error: {err}"),
            None,
        )
        .map_err(|e| crate::error::JarvisError::Playback(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioOutput for CpalPlayback {
    fn play(
        &mut self,
        _samples: &[f32],
        _sample_rate: u32,
        _device_index: Option<usize>,
    ) -> Result<()> {
        Err(crate::error::JarvisError::Playback(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
