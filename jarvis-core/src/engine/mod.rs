//! `VoiceEngine`: microphone lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! VoiceEngine::new()                         state = Inactive
//!     └─► set_mic_state(true)   → models loaded, stream open, Listening
//!         ├─► speak()           → stream closed (Speaking), play, reopened
//!         └─► set_mic_state(false) → stream closed, Inactive
//! cleanup()                     → stream closed, models dropped, released
//! ```
//!
//! Invariant: the capture stream is open iff the state is `Listening`.
//!
//! ## Threading
//!
//! Every operation takes `&mut self`; the engine has exactly one caller at a
//! time. Share it between threads behind a mutex and hold the lock for the
//! whole call. The capture callback never touches the engine, only the
//! producer half of the frame queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    audio::{AudioBackend, AudioOutput, CaptureBinding},
    buffering::{create_frame_queue_with_stats, FrameConsumer, QueueSnapshot, QueueStats},
    detect::ActivationDetector,
    error::{JarvisError, Result},
    events::{EngineStatus, EngineStatusEvent},
    models::ModelLoader,
    recognize::CommandRecorder,
    speech::{CaptureGate, SpeechOutput},
};

/// Broadcast channel capacity for status events.
const BROADCAST_CAP: usize = 64;

/// Default command recording window.
pub const DEFAULT_RECORD_DURATION: Duration = Duration::from_secs(2);

/// Configuration for `VoiceEngine`. Immutable for the engine's lifetime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Input device index; `None` selects the system default.
    pub device_index: Option<usize>,
    /// Capture sample rate (Hz). Default: 16000.
    pub sample_rate: u32,
    /// Samples per frame. Default: 512.
    pub frame_length: usize,
    /// Frame queue capacity in frames. Default: 256 (≈ 8 s).
    pub queue_capacity_frames: usize,
    /// Sleep between empty queue reads while recording. Default: 10 ms.
    pub record_poll_interval: Duration,
    /// Save every recorded command window as WAV here, if set.
    pub command_dump_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            sample_rate: 16_000,
            frame_length: 512,
            queue_capacity_frames: crate::buffering::DEFAULT_CAPACITY_FRAMES,
            record_poll_interval: Duration::from_millis(10),
            command_dump_dir: None,
        }
    }
}

impl EngineConfig {
    /// Same configuration bound to another input device.
    pub fn with_device(&self, device_index: Option<usize>) -> Self {
        Self {
            device_index,
            ..self.clone()
        }
    }
}

/// Microphone phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Inactive,
    Listening,
    /// Stream suspended for playback; returns to `Listening` afterwards.
    Speaking,
}

/// Owns the capture binding and the queue consumer.
struct Capture {
    config: EngineConfig,
    binding: Box<dyn CaptureBinding>,
    consumer: Option<FrameConsumer>,
    stats: Arc<QueueStats>,
    state: EngineState,
    status_tx: broadcast::Sender<EngineStatusEvent>,
}

impl Capture {
    /// Open a fresh queue and stream. On failure nothing stays open.
    fn open(&mut self) -> Result<()> {
        let (producer, consumer) = create_frame_queue_with_stats(
            self.config.frame_length,
            self.config.queue_capacity_frames,
            Arc::clone(&self.stats),
        );
        if let Err(e) = self.binding.start(producer) {
            self.binding.stop();
            self.state = EngineState::Inactive;
            return Err(e);
        }
        self.consumer = Some(consumer);
        self.state = EngineState::Listening;
        self.emit(EngineStatus::Listening, None);
        Ok(())
    }

    fn close(&mut self, next: EngineState) {
        self.binding.stop();
        self.consumer = None;
        self.state = next;
    }

    fn emit(&self, status: EngineStatus, detail: Option<String>) {
        let _ = self.status_tx.send(EngineStatusEvent {
            status,
            device_index: self.config.device_index,
            detail,
        });
    }
}

impl CaptureGate for Capture {
    fn suspend(&mut self) -> bool {
        if self.state != EngineState::Listening {
            return false;
        }
        self.close(EngineState::Speaking);
        self.emit(EngineStatus::Speaking, None);
        true
    }

    fn resume(&mut self) {
        if let Err(e) = self.open() {
            error!("failed to reopen microphone after speaking: {e}");
            self.emit(EngineStatus::Error, Some(e.to_string()));
        }
    }
}

/// The voice engine.
pub struct VoiceEngine {
    capture: Capture,
    loader: Arc<dyn ModelLoader>,
    detector: ActivationDetector,
    recorder: CommandRecorder,
    speech: SpeechOutput,
    released: bool,
}

impl VoiceEngine {
    /// Create an Inactive engine. Nothing is opened or loaded yet.
    pub fn new(
        config: EngineConfig,
        binding: Box<dyn CaptureBinding>,
        output: Box<dyn AudioOutput>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let recorder = CommandRecorder::new(
            config.sample_rate,
            config.record_poll_interval,
            config.command_dump_dir.clone(),
        );
        Self {
            capture: Capture {
                config,
                binding,
                consumer: None,
                stats: Arc::new(QueueStats::default()),
                state: EngineState::Inactive,
                status_tx,
            },
            loader,
            detector: ActivationDetector::new(),
            recorder,
            speech: SpeechOutput::new(output),
            released: false,
        }
    }

    /// Build an engine from a backend.
    ///
    /// # Errors
    /// `JarvisError::InvalidDevice` if the configured index is not an input
    /// device; output errors from the backend.
    pub fn from_backend(
        config: EngineConfig,
        backend: &dyn AudioBackend,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self> {
        let binding = backend.bind_input(&config)?;
        let output = backend.open_output()?;
        Ok(Self::new(config, binding, output, loader))
    }

    /// Publish status events on an existing channel instead of a private one.
    pub fn with_status_sender(mut self, tx: broadcast::Sender<EngineStatusEvent>) -> Self {
        self.capture.status_tx = tx;
        self
    }

    /// Enable or disable the microphone. Idempotent.
    ///
    /// # Errors
    /// Collaborator load or device open failures when enabling; the engine is
    /// left Inactive with collaborators unloaded. `JarvisError::Released`
    /// when enabling after `cleanup()`.
    pub fn set_mic_state(&mut self, enabled: bool) -> Result<()> {
        match (enabled, self.capture.state) {
            (true, EngineState::Inactive) => self.start_listening(),
            (false, EngineState::Listening) => {
                self.stop_listening();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn start_listening(&mut self) -> Result<()> {
        if self.released {
            return Err(JarvisError::Released);
        }

        let result = self.load_models().and_then(|()| {
            info!(
                device = ?self.capture.config.device_index,
                sample_rate = self.capture.config.sample_rate,
                frame_length = self.capture.config.frame_length,
                "starting microphone"
            );
            self.capture.open()
        });

        if let Err(e) = result {
            error!("failed to start microphone: {e}");
            self.unload_models();
            self.capture.emit(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        info!("microphone active");
        Ok(())
    }

    fn stop_listening(&mut self) {
        if self.capture.state != EngineState::Listening {
            return;
        }
        self.capture.close(EngineState::Inactive);
        self.capture.emit(EngineStatus::Inactive, None);
        info!("microphone inactive");
    }

    fn load_models(&mut self) -> Result<()> {
        let loader = Arc::clone(&self.loader);
        self.detector.load(loader.as_ref(), &self.capture.config)?;
        self.recorder.load(loader.as_ref())?;
        self.speech.load(loader.as_ref())?;
        Ok(())
    }

    fn unload_models(&mut self) {
        self.detector.unload();
        self.recorder.unload();
        self.speech.unload();
    }

    /// Pop at most one frame and run it through the wake-word detector.
    ///
    /// Never blocks. False when not Listening or when no frame is queued.
    pub fn check_activation(&mut self) -> bool {
        if self.capture.state != EngineState::Listening {
            return false;
        }
        let Some(consumer) = self.capture.consumer.as_mut() else {
            return false;
        };
        match consumer.pop_frame() {
            Some(frame) => self.detector.check(&frame),
            None => false,
        }
    }

    /// Complete frames waiting in the queue; zero unless Listening.
    pub fn pending_frames(&self) -> usize {
        self.capture
            .consumer
            .as_ref()
            .map_or(0, FrameConsumer::pending_frames)
    }

    /// Capture `duration` of audio and return the recognised text.
    ///
    /// Empty when not Listening, when no frames arrived or when recognition
    /// failed.
    pub fn record_command(&mut self, duration: Duration) -> String {
        if self.capture.state != EngineState::Listening {
            warn!("record_command called while microphone is inactive");
            return String::new();
        }
        let Some(consumer) = self.capture.consumer.as_mut() else {
            return String::new();
        };
        self.recorder.record(consumer, duration)
    }

    /// Speak `text` with capture suspended for the duration of playback.
    ///
    /// No-op unless Listening, for blank text, or without a loaded
    /// synthesizer. Blocks until playback ends. Never fails.
    pub fn speak(&mut self, text: &str, output_device: Option<usize>) {
        if self.capture.state != EngineState::Listening {
            return;
        }
        self.speech.speak(text, output_device, &mut self.capture);
    }

    /// Stop listening and release every collaborator. Idempotent; the engine
    /// cannot be enabled again afterwards.
    pub fn cleanup(&mut self) {
        self.stop_listening();
        self.capture.binding.stop();
        self.unload_models();
        if !self.released {
            self.released = true;
            self.capture.emit(EngineStatus::Released, None);
            info!("voice engine resources released");
        }
    }

    pub fn state(&self) -> EngineState {
        self.capture.state
    }

    /// True while Listening.
    pub fn is_active(&self) -> bool {
        self.capture.state == EngineState::Listening
    }

    /// Whether the binding reports an open stream.
    pub fn is_capturing(&self) -> bool {
        self.capture.binding.is_open()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether any collaborator handle is currently loaded.
    pub fn models_loaded(&self) -> bool {
        self.detector.is_loaded() || self.recorder.is_loaded() || self.speech.is_loaded()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.capture.config
    }

    /// Frame queue counters accumulated over every stream this engine opened.
    pub fn diagnostics(&self) -> QueueSnapshot {
        self.capture.stats.snapshot()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.capture.status_tx.subscribe()
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        self.capture.binding.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeLoader};

    fn engine(backend: &FakeBackend, loader: FakeLoader) -> VoiceEngine {
        VoiceEngine::from_backend(EngineConfig::default(), backend, Arc::new(loader))
            .expect("fake backend binds the default device")
    }

    #[test]
    fn enable_disable_tracks_stream() {
        let backend = FakeBackend::new();
        let mut eng = engine(&backend, FakeLoader::new(backend.log()));

        assert_eq!(eng.state(), EngineState::Inactive);
        assert!(!eng.is_capturing());

        eng.set_mic_state(true).unwrap();
        assert_eq!(eng.state(), EngineState::Listening);
        assert!(eng.is_capturing());
        assert!(eng.models_loaded());

        eng.set_mic_state(true).unwrap();
        assert_eq!(backend.opens(), 1, "enable is idempotent");

        eng.set_mic_state(false).unwrap();
        assert_eq!(eng.state(), EngineState::Inactive);
        assert!(!eng.is_capturing());
        assert!(eng.models_loaded(), "disable keeps collaborators loaded");
    }

    #[test]
    fn open_failure_leaves_engine_inactive_and_unloaded() {
        let backend = FakeBackend::new();
        backend.fail_next_open();
        let mut eng = engine(&backend, FakeLoader::new(backend.log()));

        let err = eng.set_mic_state(true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceInit);
        assert_eq!(eng.state(), EngineState::Inactive);
        assert!(!eng.is_capturing());
        assert!(!eng.models_loaded());

        // Retry succeeds.
        eng.set_mic_state(true).unwrap();
        assert!(eng.is_active());
    }

    #[test]
    fn load_failure_never_opens_the_device() {
        let backend = FakeBackend::new();
        let mut loader = FakeLoader::new(backend.log());
        loader.fail_synthesizer_load = true;
        let mut eng = engine(&backend, loader);

        assert!(eng.set_mic_state(true).is_err());
        assert_eq!(backend.opens(), 0);
        assert!(!eng.models_loaded());
        assert_eq!(eng.state(), EngineState::Inactive);
    }

    #[test]
    fn released_engine_refuses_enable() {
        let backend = FakeBackend::new();
        let mut eng = engine(&backend, FakeLoader::new(backend.log()));
        eng.set_mic_state(true).unwrap();
        eng.cleanup();
        assert!(matches!(eng.set_mic_state(true), Err(JarvisError::Released)));
        assert!(!eng.is_capturing());
    }

    #[test]
    fn status_events_follow_transitions() {
        let backend = FakeBackend::new();
        let mut eng = engine(&backend, FakeLoader::new(backend.log()));
        let mut rx = eng.subscribe_status();

        eng.set_mic_state(true).unwrap();
        eng.speak("hello", None);
        eng.set_mic_state(false).unwrap();
        eng.cleanup();

        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev.status);
        }
        assert_eq!(
            seen,
            vec![
                EngineStatus::Listening,
                EngineStatus::Speaking,
                EngineStatus::Listening,
                EngineStatus::Inactive,
                EngineStatus::Released,
            ]
        );
    }
}
