//! Shared assistant state.
//!
//! `AssistantContext` is shared (behind `Arc`) by the main polling loop and the
//! console control thread. The engine lives in a mutex and is only ever
//! touched with that lock held, so a `/mic off` typed during a recording
//! window waits for the window to finish instead of racing it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use jarvis_core::{
    audio::{AudioBackend, DeviceInfo},
    EngineConfig, EngineStatusEvent, JarvisError, ModelLoader, VoiceEngine,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Status broadcast capacity shared by every engine this context builds.
const STATUS_CAP: usize = 64;

/// User-facing mode switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssistantMode {
    pub mic_enabled: bool,
    pub text_mode: bool,
    pub hybrid_mode: bool,
    /// `None` = system default input.
    pub mic_device_index: Option<usize>,
}

/// Directives for the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Shutdown,
}

pub struct AssistantContext {
    mode: RwLock<AssistantMode>,
    engine: Mutex<Option<VoiceEngine>>,
    shutdown: AtomicBool,
    control_tx: Sender<ControlCommand>,
    backend: Arc<dyn AudioBackend>,
    loader: Arc<dyn ModelLoader>,
    base_config: EngineConfig,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    output_device: Option<usize>,
}

impl AssistantContext {
    /// Build the context and the receiving end of the control channel.
    pub fn new(
        mode: AssistantMode,
        base_config: EngineConfig,
        backend: Arc<dyn AudioBackend>,
        loader: Arc<dyn ModelLoader>,
        output_device: Option<usize>,
    ) -> (Self, Receiver<ControlCommand>) {
        let (control_tx, control_rx) = unbounded();
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        let ctx = Self {
            mode: RwLock::new(mode),
            engine: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            control_tx,
            backend,
            loader,
            base_config,
            status_tx,
            output_device,
        };
        (ctx, control_rx)
    }

    pub fn mode(&self) -> AssistantMode {
        *self.mode.read()
    }

    pub fn output_device(&self) -> Option<usize> {
        self.output_device
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.backend.input_devices()
    }

    /// Status events from the current engine and every replacement.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Run `f` with the engine lock held. `None` when no engine exists.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut VoiceEngine) -> R) -> Option<R> {
        self.engine.lock().as_mut().map(f)
    }

    /// Build the engine for the current device and enable it if the mic is on.
    ///
    /// Called once by the main thread at startup.
    pub fn start_engine(&self) -> Result<(), JarvisError> {
        let mut slot = self.engine.lock();
        if slot.is_some() {
            return Ok(());
        }
        let mode = self.mode();
        let engine = slot.insert(self.build_engine(mode.mic_device_index)?);
        if mode.mic_enabled {
            engine.set_mic_state(true)?;
        }
        Ok(())
    }

    /// Turn the microphone on or off, building the engine on first enable.
    ///
    /// Called from the control thread.
    pub fn set_mic_enabled(&self, enabled: bool) -> Result<(), JarvisError> {
        self.mode.write().mic_enabled = enabled;
        let mut slot = self.engine.lock();
        match slot.as_mut() {
            Some(engine) => engine.set_mic_state(enabled),
            None if enabled => {
                let index = self.mode().mic_device_index;
                slot.insert(self.build_engine(index)?).set_mic_state(true)
            }
            None => Ok(()),
        }
    }

    /// Called from the control thread.
    pub fn set_text_mode(&self, enabled: bool) {
        self.mode.write().text_mode = enabled;
    }

    /// Called from the control thread.
    pub fn set_hybrid_mode(&self, enabled: bool) {
        self.mode.write().hybrid_mode = enabled;
    }

    /// Switch to input device `index`.
    ///
    /// The index is validated first; an invalid one leaves the running engine
    /// untouched. The old engine is cleaned up (its device closed) before the
    /// new one is built, so two bindings never coexist. Called from the
    /// control thread.
    pub fn set_mic(&self, index: usize) -> Result<(), JarvisError> {
        if !self.backend.input_devices().iter().any(|d| d.index == index) {
            return Err(JarvisError::InvalidDevice { index });
        }

        let mut slot = self.engine.lock();
        if let Some(mut old) = slot.take() {
            old.cleanup();
        }
        self.mode.write().mic_device_index = Some(index);

        let engine = slot.insert(self.build_engine(Some(index))?);
        if self.mode().mic_enabled {
            engine.set_mic_state(true)?;
        }
        info!(index, "microphone device switched");
        Ok(())
    }

    fn build_engine(&self, device_index: Option<usize>) -> Result<VoiceEngine, JarvisError> {
        let config = self.base_config.with_device(device_index);
        let engine =
            VoiceEngine::from_backend(config, self.backend.as_ref(), Arc::clone(&self.loader))?;
        Ok(engine.with_status_sender(self.status_tx.clone()))
    }

    /// Ask the main loop to exit. Called from the control thread.
    pub fn request_shutdown(&self) {
        if self.control_tx.send(ControlCommand::Shutdown).is_err() {
            warn!("main loop already gone, marking shutdown directly");
            self.shutdown.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Release the engine and raise the shutdown flag. Called by the main
    /// thread on exit.
    pub fn shutdown(&self) {
        if let Some(mut engine) = self.engine.lock().take() {
            engine.cleanup();
        }
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
