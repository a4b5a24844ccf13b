//! In-memory audio backend and collaborators.
//!
//! Used by the engine tests and by the app crate to drive a `VoiceEngine`
//! without audio hardware or models. Every fake appends to a shared
//! [`EventLog`], so tests can assert the exact order of device opens, closes,
//! synthesis and playback.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{
    audio::{AudioBackend, AudioOutput, CaptureBinding, DeviceInfo},
    buffering::{Frame, FrameProducer},
    detect::WakeWordDetector,
    engine::EngineConfig,
    error::{JarvisError, Result},
    models::ModelLoader,
    recognize::{stub::StubRecognizer, SpeechRecognizer},
    speech::{SpeechSynthesizer, SynthesizedAudio},
};

/// Ordered record of observable side effects.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// State shared between the backend, its bindings and feeders.
#[derive(Default)]
struct Shared {
    producer: Mutex<Option<FrameProducer>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_next_open: AtomicBool,
}

/// Fake [`AudioBackend`] with a fixed device list.
pub struct FakeBackend {
    devices: Vec<DeviceInfo>,
    log: EventLog,
    shared: Arc<Shared>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// One default input device at index 0.
    pub fn new() -> Self {
        Self::with_devices(&["Fake Microphone"])
    }

    /// Devices indexed in order; the first is the default.
    pub fn with_devices(names: &[&str]) -> Self {
        let devices = names
            .iter()
            .enumerate()
            .map(|(index, name)| DeviceInfo {
                index,
                name: (*name).to_string(),
                is_default: index == 0,
                is_loopback_like: false,
                max_input_channels: 1,
            })
            .collect();
        Self {
            devices,
            log: EventLog::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    /// Make the next `start()` on any binding fail.
    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Handle that pushes frames into whichever stream is currently open.
    pub fn feeder(&self) -> FrameFeeder {
        FrameFeeder {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AudioBackend for FakeBackend {
    fn input_devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn bind_input(&self, config: &EngineConfig) -> Result<Box<dyn CaptureBinding>> {
        if let Some(index) = config.device_index {
            if !self.devices.iter().any(|d| d.index == index) {
                return Err(JarvisError::InvalidDevice { index });
            }
        }
        let label = config
            .device_index
            .map_or_else(|| "default".to_string(), |i| i.to_string());
        Ok(Box::new(FakeBinding {
            label,
            log: self.log.clone(),
            shared: Arc::clone(&self.shared),
            open: false,
        }))
    }

    fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(RecordingOutput {
            log: self.log.clone(),
        }))
    }
}

/// Binding that logs `open:<device>` / `close:<device>`.
pub struct FakeBinding {
    label: String,
    log: EventLog,
    shared: Arc<Shared>,
    open: bool,
}

impl CaptureBinding for FakeBinding {
    fn start(&mut self, producer: FrameProducer) -> Result<()> {
        self.stop();
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(JarvisError::AudioDevice(format!(
                "device {} is busy",
                self.label
            )));
        }
        *self.shared.producer.lock() = Some(producer);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("open:{}", self.label));
        self.open = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.open {
            return;
        }
        self.shared.producer.lock().take();
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("close:{}", self.label));
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Stands in for the audio callback.
#[derive(Clone)]
pub struct FrameFeeder {
    shared: Arc<Shared>,
}

impl FrameFeeder {
    /// Push one frame. False when no stream is open or the queue is full.
    pub fn push(&self, frame: &Frame) -> bool {
        match self.shared.producer.lock().as_mut() {
            Some(producer) => producer.push_frame(frame),
            None => false,
        }
    }

    /// Push a frame of `len` copies of `value`.
    pub fn push_constant(&self, value: i16, len: usize) -> bool {
        self.push(&Frame::new(vec![value; len]))
    }
}

/// Playback sink that only logs `play`.
pub struct RecordingOutput {
    log: EventLog,
}

impl AudioOutput for RecordingOutput {
    fn play(
        &mut self,
        _samples: &[f32],
        _sample_rate: u32,
        _device_index: Option<usize>,
    ) -> Result<()> {
        self.log.push("play");
        Ok(())
    }
}

/// Counts collaborator handles that have not been dropped yet.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Loader producing scripted collaborators.
///
/// Clones share counters, so keep one clone to inspect after handing the
/// other to an engine.
#[derive(Clone)]
pub struct FakeLoader {
    log: EventLog,
    live: Arc<AtomicUsize>,
    recognize_calls: Arc<AtomicUsize>,
    /// 1-based frame numbers on which the wake word fires.
    pub wake_on: Vec<usize>,
    /// Text returned by the recognizer; `None` uses the stub description.
    pub transcript: Option<String>,
    pub frame_length: usize,
    pub sample_rate: u32,
    pub fail_wake_word_load: bool,
    pub fail_synthesizer_load: bool,
    pub fail_synthesis: bool,
}

impl FakeLoader {
    pub fn new(log: EventLog) -> Self {
        let defaults = EngineConfig::default();
        Self {
            log,
            live: Arc::new(AtomicUsize::new(0)),
            recognize_calls: Arc::new(AtomicUsize::new(0)),
            wake_on: Vec::new(),
            transcript: None,
            frame_length: defaults.frame_length,
            sample_rate: defaults.sample_rate,
            fail_wake_word_load: false,
            fail_synthesizer_load: false,
            fail_synthesis: false,
        }
    }

    /// Collaborator handles currently alive.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }
}

impl ModelLoader for FakeLoader {
    fn load_wake_word(&self) -> Result<Box<dyn WakeWordDetector>> {
        if self.fail_wake_word_load {
            return Err(JarvisError::WakeWord("invalid access key".into()));
        }
        Ok(Box::new(ScriptedWakeWord {
            wake_on: self.wake_on.clone(),
            frames_seen: 0,
            frame_length: self.frame_length,
            sample_rate: self.sample_rate,
            _live: LiveGuard::new(&self.live),
        }))
    }

    fn load_recognizer(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Ok(Box::new(CountingRecognizer {
            calls: Arc::clone(&self.recognize_calls),
            transcript: self.transcript.clone(),
            _live: LiveGuard::new(&self.live),
        }))
    }

    fn load_synthesizer(&self) -> Result<Box<dyn SpeechSynthesizer>> {
        if self.fail_synthesizer_load {
            return Err(JarvisError::Synthesis("voice pack missing".into()));
        }
        Ok(Box::new(LoggingSynthesizer {
            log: self.log.clone(),
            fail: self.fail_synthesis,
            _live: LiveGuard::new(&self.live),
        }))
    }
}

/// Fires on a fixed list of frame numbers.
struct ScriptedWakeWord {
    wake_on: Vec<usize>,
    frames_seen: usize,
    frame_length: usize,
    sample_rate: u32,
    _live: LiveGuard,
}

impl WakeWordDetector for ScriptedWakeWord {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, _frame: &Frame) -> Result<Option<usize>> {
        self.frames_seen += 1;
        Ok(self.wake_on.contains(&self.frames_seen).then_some(0))
    }
}

struct CountingRecognizer {
    calls: Arc<AtomicUsize>,
    transcript: Option<String>,
    _live: LiveGuard,
}

impl SpeechRecognizer for CountingRecognizer {
    fn transcribe(&mut self, samples: &[i16], sample_rate: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transcript
            .clone()
            .unwrap_or_else(|| StubRecognizer::canned_text(samples.len(), sample_rate)))
    }
}

struct LoggingSynthesizer {
    log: EventLog,
    fail: bool,
    _live: LiveGuard,
}

impl SpeechSynthesizer for LoggingSynthesizer {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio> {
        self.log.push("synthesize");
        if self.fail {
            return Err(JarvisError::Synthesis(format!("cannot voice '{text}'")));
        }
        Ok(SynthesizedAudio {
            samples: vec![0.0; text.len() * 10],
            sample_rate: 16_000,
        })
    }
}
