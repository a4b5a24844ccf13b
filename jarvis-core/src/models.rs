//! Collaborator loading.
//!
//! The wake-word, speech-to-text and text-to-speech collaborators are loaded
//! lazily the first time the microphone is enabled and released on
//! `cleanup()`. Each handle lives in a [`Slot`], so "loaded or not" is a state
//! transition rather than a null check at every call site.

use std::path::PathBuf;

use tracing::info;

use crate::detect::{energy::EnergyWakeDetector, WakeWordDetector};
use crate::error::{JarvisError, Result};
use crate::recognize::{stub::StubRecognizer, SpeechRecognizer};
use crate::speech::{tone::ToneSynthesizer, SpeechSynthesizer};

/// A lazily loaded collaborator handle.
pub enum Slot<T> {
    Unloaded,
    Loaded(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Unloaded
    }
}

impl<T> Slot<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded(_))
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Loaded(handle) => Some(handle),
            Slot::Unloaded => None,
        }
    }

    /// Run `load` only if the slot is empty.
    pub fn ensure_loaded(&mut self, load: impl FnOnce() -> Result<T>) -> Result<&mut T> {
        if let Slot::Unloaded = self {
            *self = Slot::Loaded(load()?);
        }
        match self {
            Slot::Loaded(handle) => Ok(handle),
            Slot::Unloaded => unreachable!("slot was just loaded"),
        }
    }

    /// Drop the handle (if any), returning the slot to `Unloaded`.
    pub fn unload(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Slot::Loaded(handle) => Some(handle),
            Slot::Unloaded => None,
        }
    }
}

/// Wake-word collaborator parameters.
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Vendor access token; unused by the built-in detector.
    pub access_key: Option<String>,
    pub keywords: Vec<String>,
    /// One sensitivity in [0, 1] per keyword.
    pub sensitivities: Vec<f32>,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            keywords: vec!["jarvis".into()],
            sensitivities: vec![0.7],
        }
    }
}

/// Speech-to-text collaborator parameters.
#[derive(Debug, Clone, Default)]
pub struct RecognizerConfig {
    /// Local model directory prepared by an external setup step.
    pub model_path: Option<PathBuf>,
}

/// Text-to-speech collaborator parameters.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub language: String,
    pub speaker: String,
    /// Rate the synthesizer renders at (Hz).
    pub sample_rate: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            speaker: "default".into(),
            sample_rate: 48_000,
        }
    }
}

/// All collaborator parameters, as read from settings.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    pub wake_word: WakeWordConfig,
    pub recognizer: RecognizerConfig,
    pub synthesizer: SynthesizerConfig,
}

/// Creates collaborator handles. Dropping a handle releases it.
pub trait ModelLoader: Send + Sync {
    fn load_wake_word(&self) -> Result<Box<dyn WakeWordDetector>>;

    fn load_recognizer(&self) -> Result<Box<dyn SpeechRecognizer>>;

    fn load_synthesizer(&self) -> Result<Box<dyn SpeechSynthesizer>>;
}

/// Loader for the built-in backends (energy wake detector, stub recognizer,
/// tone synthesizer).
#[derive(Debug, Clone, Default)]
pub struct BuiltinLoader {
    config: ModelConfig,
}

impl BuiltinLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl ModelLoader for BuiltinLoader {
    fn load_wake_word(&self) -> Result<Box<dyn WakeWordDetector>> {
        let cfg = &self.config.wake_word;
        if cfg.keywords.is_empty() {
            return Err(JarvisError::WakeWord("no wake keywords configured".into()));
        }
        if cfg.sensitivities.len() != cfg.keywords.len() {
            return Err(JarvisError::WakeWord(format!(
                "{} keywords but {} sensitivities",
                cfg.keywords.len(),
                cfg.sensitivities.len()
            )));
        }
        if let Some(bad) = cfg.sensitivities.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(JarvisError::WakeWord(format!(
                "sensitivity {bad} is outside [0, 1]"
            )));
        }

        // Energy detection cannot tell keywords apart; the most sensitive wins.
        let sensitivity = cfg.sensitivities.iter().copied().fold(0.0f32, f32::max);
        info!(keywords = ?cfg.keywords, sensitivity, "wake word detector loaded");
        Ok(Box::new(EnergyWakeDetector::with_sensitivity(sensitivity)))
    }

    fn load_recognizer(&self) -> Result<Box<dyn SpeechRecognizer>> {
        if let Some(path) = &self.config.recognizer.model_path {
            if !path.exists() {
                return Err(JarvisError::ModelNotFound { path: path.clone() });
            }
        }
        info!("speech recognizer loaded");
        Ok(Box::new(StubRecognizer::new()))
    }

    fn load_synthesizer(&self) -> Result<Box<dyn SpeechSynthesizer>> {
        let cfg = &self.config.synthesizer;
        info!(
            language = cfg.language.as_str(),
            speaker = cfg.speaker.as_str(),
            sample_rate = cfg.sample_rate,
            "speech synthesizer loaded"
        );
        Ok(Box::new(ToneSynthesizer::new(cfg.sample_rate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_loads_once() {
        let mut slot: Slot<u32> = Slot::default();
        let mut calls = 0;
        slot.ensure_loaded(|| {
            calls += 1;
            Ok(7)
        })
        .unwrap();
        slot.ensure_loaded(|| {
            calls += 1;
            Ok(8)
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(slot.get_mut(), Some(&mut 7));
    }

    #[test]
    fn slot_load_failure_stays_unloaded() {
        let mut slot: Slot<u32> = Slot::default();
        let err = slot.ensure_loaded(|| Err(JarvisError::WakeWord("bad key".into())));
        assert!(err.is_err());
        assert!(!slot.is_loaded());
    }

    #[test]
    fn slot_unload_returns_handle() {
        let mut slot = Slot::Loaded("handle");
        assert_eq!(slot.unload(), Some("handle"));
        assert_eq!(slot.unload(), None);
        assert!(!slot.is_loaded());
    }

    #[test]
    fn builtin_rejects_mismatched_sensitivities() {
        let loader = BuiltinLoader::new(ModelConfig {
            wake_word: WakeWordConfig {
                access_key: None,
                keywords: vec!["jarvis".into(), "computer".into()],
                sensitivities: vec![0.5],
            },
            ..ModelConfig::default()
        });
        assert!(matches!(
            loader.load_wake_word(),
            Err(JarvisError::WakeWord(_))
        ));
    }

    #[test]
    fn builtin_reports_missing_model_path() {
        let loader = BuiltinLoader::new(ModelConfig {
            recognizer: RecognizerConfig {
                model_path: Some(PathBuf::from("/definitely/not/here/vosk")),
            },
            ..ModelConfig::default()
        });
        match loader.load_recognizer() {
            Err(JarvisError::ModelNotFound { path }) => {
                assert!(path.ends_with("vosk"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected ModelNotFound"),
        }
    }

    #[test]
    fn builtin_defaults_load() {
        let loader = BuiltinLoader::default();
        assert!(loader.load_wake_word().is_ok());
        assert!(loader.load_recognizer().is_ok());
        assert!(loader.load_synthesizer().is_ok());
    }
}
