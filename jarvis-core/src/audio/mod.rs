//! Audio device binding via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread. It **must not** block
//! on a mutex, perform I/O or run detection. It converts the delivered buffer
//! to mono `i16` and pushes it into the frame queue producer, whose
//! `push_samples` is wait-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS), but the engine that owns a binding is handed between the control
//! thread and the main loop. `CpalBinding` therefore builds the stream on a
//! dedicated capture thread and keeps it there; a bounded channel reports the
//! open result back to `start()`, and `stop()` joins the thread so the device
//! is released before `stop()` returns.

pub mod device;
pub mod playback;
pub mod resample;

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info};

use crate::{
    buffering::FrameProducer,
    engine::EngineConfig,
    error::{JarvisError, Result},
};

pub use device::{list_input_devices, DeviceInfo};
pub use playback::{AudioOutput, CpalPlayback};

/// One hardware input stream bound to a device, sample rate and frame length.
///
/// `stop()` must release OS resources and be safe to call at any time,
/// including when `start()` never succeeded.
pub trait CaptureBinding: Send {
    /// Open the device and start pushing captured audio into `producer`.
    fn start(&mut self, producer: FrameProducer) -> Result<()>;

    /// Close the device. Idempotent.
    fn stop(&mut self);

    /// Whether a stream is currently open.
    fn is_open(&self) -> bool;
}

/// Factory for capture bindings and output sinks.
pub trait AudioBackend: Send + Sync {
    /// Input-capable devices with the index accepted by `bind_input`.
    fn input_devices(&self) -> Vec<DeviceInfo>;

    /// Create an unopened binding for the device named by `config`.
    ///
    /// # Errors
    /// `JarvisError::InvalidDevice` if `config.device_index` does not name an
    /// input-capable device.
    fn bind_input(&self, config: &EngineConfig) -> Result<Box<dyn CaptureBinding>>;

    /// Open a playback sink.
    fn open_output(&self) -> Result<Box<dyn AudioOutput>>;
}

/// The cpal-backed [`AudioBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn input_devices(&self) -> Vec<DeviceInfo> {
        list_input_devices()
    }

    fn bind_input(&self, config: &EngineConfig) -> Result<Box<dyn CaptureBinding>> {
        if let Some(index) = config.device_index {
            if !self.input_devices().iter().any(|d| d.index == index) {
                return Err(JarvisError::InvalidDevice { index });
            }
        }
        Ok(Box::new(CpalBinding::new(config.clone())))
    }

    fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(CpalPlayback::new()))
    }
}

struct CaptureWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Capture binding that owns one cpal input stream on a dedicated thread.
pub struct CpalBinding {
    config: EngineConfig,
    worker: Option<CaptureWorker>,
}

impl CpalBinding {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            worker: None,
        }
    }
}

impl CaptureBinding for CpalBinding {
    fn start(&mut self, producer: FrameProducer) -> Result<()> {
        // Never hold two streams on one device.
        self.stop();

        let (open_tx, open_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                // ── Open device (must happen on THIS thread: cpal::Stream is !Send) ──
                let stream = match open_input_stream(&config, producer) {
                    Ok(stream) => {
                        let _ = open_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop() is called or the binding is dropped.
                let _ = stop_rx.recv();

                // Stream drops here, releasing the audio device on this thread.
                drop(stream);
                debug!("capture thread exiting");
            })?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(JarvisError::Other(anyhow::anyhow!(
                    "capture thread died before opening the device"
                )))
            }
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            error!("capture thread panicked while closing the stream");
        }
        info!(
            device = ?self.config.device_index,
            "input stream closed"
        );
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalBinding {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio-cpal")]
fn open_input_stream(config: &EngineConfig, producer: FrameProducer) -> Result<cpal::Stream> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize};

    let host = cpal::default_host();
    let device = match config.device_index {
        None => host
            .default_input_device()
            .ok_or(JarvisError::NoDefaultInputDevice)?,
        Some(index) => host
            .devices()
            .map_err(|e| JarvisError::AudioDevice(e.to_string()))?
            .nth(index)
            .ok_or(JarvisError::InvalidDevice { index })?,
    };

    let name = device.name().unwrap_or_default();
    let rate = SampleRate(config.sample_rate);

    let ranges = device
        .supported_input_configs()
        .map_err(|e| JarvisError::AudioDevice(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate);
    let range = pick_capture_config(ranges, |c| (c.sample_format(), c.channels()))
        .ok_or_else(|| {
            JarvisError::AudioDevice(format!(
                "device '{name}' does not support {} Hz capture",
                config.sample_rate
            ))
        })?;

    let supported = range.with_sample_rate(rate);
    let sample_format = supported.sample_format();
    let mut stream_config = supported.config();
    let frame_length = config.frame_length as u32;
    if let SupportedBufferSize::Range { min, max } = supported.buffer_size() {
        if (*min..=*max).contains(&frame_length) {
            stream_config.buffer_size = cpal::BufferSize::Fixed(frame_length);
        }
    }

    info!(
        device = name.as_str(),
        sample_rate = config.sample_rate,
        channels = stream_config.channels,
        format = ?sample_format,
        frame_length = config.frame_length,
        "opening input stream"
    );

    let stream = match sample_format {
        SampleFormat::I16 => build_capture_stream::<i16>(&device, &stream_config, producer),
        SampleFormat::F32 => build_capture_stream::<f32>(&device, &stream_config, producer),
        SampleFormat::U16 => build_capture_stream::<u16>(&device, &stream_config, producer),
        fmt => {
            return Err(JarvisError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

    Ok(stream)
}

/// Position of `format` among the sample formats the capture callback can
/// convert; `None` for formats it cannot build a stream for.
#[cfg(feature = "audio-cpal")]
fn capture_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    use cpal::SampleFormat;
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Best capture candidate: mono first, then native i16, then fewest
/// channels. Candidates in unsupported sample formats are skipped, so a
/// stereo i16 range beats a mono i32 one.
#[cfg(feature = "audio-cpal")]
fn pick_capture_config<T>(
    candidates: impl Iterator<Item = T>,
    describe: impl Fn(&T) -> (cpal::SampleFormat, u16),
) -> Option<T> {
    candidates
        .filter_map(|c| {
            let (format, channels) = describe(&c);
            let rank = capture_format_rank(format)?;
            Some(((channels != 1, rank, channels), c))
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, c)| c)
}

#[cfg(feature = "audio-cpal")]
fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: FrameProducer,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;
    use cpal::Sample;
    use tracing::warn;

    let channels = config.channels.max(1) as usize;
    let stats = std::sync::Arc::clone(producer.stats());
    let mut mono: Vec<i16> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0);
                if channels == 1 {
                    for (dst, sample) in mono.iter_mut().zip(data) {
                        *dst = i16::from_sample(*sample);
                    }
                } else {
                    for (f, dst) in mono.iter_mut().enumerate() {
                        let base = f * channels;
                        let sum: i32 = data[base..base + channels]
                            .iter()
                            .map(|s| i32::from(i16::from_sample(*s)))
                            .sum();
                        *dst = (sum / channels as i32) as i16;
                    }
                }
                if !producer.push_samples(&mono) {
                    warn!("frame queue full: dropped {} samples", mono.len());
                }
            },
            move |err| {
                stats.record_stream_error();
                warn!("audio stream error: {err}");
            },
            None,
        )
        .map_err(|e| JarvisError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
fn open_input_stream(_config: &EngineConfig, _producer: FrameProducer) -> Result<()> {
    Err(JarvisError::AudioStream(
        "compiled without audio-cpal feature".into(),
    ))
}
