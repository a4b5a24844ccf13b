//! Persistent assistant settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jarvis_core::models::{ModelConfig, RecognizerConfig, SynthesizerConfig, WakeWordConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACTIVATION_PROMPT: &str = "Yes, sir?";
pub const DEFAULT_MATCH_THRESHOLD: u32 = 70;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub wake_keywords: Vec<String>,
    pub wake_sensitivity: f32,
    pub access_key: Option<String>,
    pub recognizer_model_path: Option<PathBuf>,
    pub tts_language: String,
    pub tts_speaker: String,
    pub tts_sample_rate: u32,
    pub record_seconds: f32,
    pub activation_prompt: String,
    pub match_threshold: u32,
    pub poll_interval_ms: u64,
    pub preferred_mic_index: Option<usize>,
    pub output_device_index: Option<usize>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            wake_keywords: vec!["jarvis".into()],
            wake_sensitivity: 0.7,
            access_key: None,
            recognizer_model_path: None,
            tts_language: "en".into(),
            tts_speaker: "default".into(),
            tts_sample_rate: 48_000,
            record_seconds: 2.0,
            activation_prompt: DEFAULT_ACTIVATION_PROMPT.into(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            poll_interval_ms: 100,
            preferred_mic_index: None,
            output_device_index: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.wake_keywords = normalize_keywords(&self.wake_keywords);
        self.wake_sensitivity = if self.wake_sensitivity.is_finite() {
            self.wake_sensitivity.clamp(0.0, 1.0)
        } else {
            0.7
        };
        self.access_key = self
            .access_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.recognizer_model_path = self
            .recognizer_model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
        self.tts_language = normalize_tts_language(&self.tts_language);
        let speaker = self.tts_speaker.trim();
        self.tts_speaker = if speaker.is_empty() {
            "default".into()
        } else {
            speaker.into()
        };
        self.tts_sample_rate = self.tts_sample_rate.clamp(8_000, 96_000);
        self.record_seconds = if self.record_seconds.is_finite() {
            self.record_seconds.clamp(0.5, 30.0)
        } else {
            2.0
        };
        let prompt = self.activation_prompt.trim();
        self.activation_prompt = if prompt.is_empty() {
            DEFAULT_ACTIVATION_PROMPT.into()
        } else {
            prompt.into()
        };
        self.match_threshold = self.match_threshold.min(100);
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1_000);
    }

    /// Collaborator parameters for the engine's model loader.
    ///
    /// `access_key` (from the CLI or environment) overrides the stored key.
    pub fn model_config(&self, access_key: Option<String>) -> ModelConfig {
        ModelConfig {
            wake_word: WakeWordConfig {
                access_key: access_key.or_else(|| self.access_key.clone()),
                keywords: self.wake_keywords.clone(),
                sensitivities: vec![self.wake_sensitivity; self.wake_keywords.len()],
            },
            recognizer: RecognizerConfig {
                model_path: self.recognizer_model_path.clone(),
            },
            synthesizer: SynthesizerConfig {
                language: self.tts_language.clone(),
                speaker: self.tts_speaker.clone(),
                sample_rate: self.tts_sample_rate,
            },
        }
    }

    pub fn record_duration(&self) -> Duration {
        Duration::from_secs_f32(self.record_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn normalize_keywords(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in raw {
        let normalized = keyword.trim().to_lowercase();
        if normalized.is_empty() || out.contains(&normalized) {
            continue;
        }
        out.push(normalized);
    }
    if out.is_empty() {
        out.push("jarvis".into());
    }
    out
}

pub fn normalize_tts_language(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ru" | "rus" | "russian" => "ru".into(),
        "de" | "ger" | "german" => "de".into(),
        "es" | "spa" | "spanish" => "es".into(),
        _ => "en".into(),
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Jarvis")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("jarvis")
            .join("settings.json")
    }
}

/// Read settings, falling back to defaults for a missing or malformed file.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "ignoring malformed settings: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_and_fills_blanks() {
        let mut settings = AppSettings {
            wake_keywords: vec!["  ".into(), "Jarvis".into(), "jarvis".into(), "Friday".into()],
            wake_sensitivity: 3.0,
            access_key: Some("   ".into()),
            tts_language: "Russian".into(),
            tts_speaker: " ".into(),
            record_seconds: 120.0,
            activation_prompt: "".into(),
            match_threshold: 250,
            poll_interval_ms: 0,
            ..AppSettings::default()
        };
        settings.normalize();

        assert_eq!(settings.wake_keywords, vec!["jarvis", "friday"]);
        assert_eq!(settings.wake_sensitivity, 1.0);
        assert_eq!(settings.access_key, None);
        assert_eq!(settings.tts_language, "ru");
        assert_eq!(settings.tts_speaker, "default");
        assert_eq!(settings.record_seconds, 30.0);
        assert_eq!(settings.activation_prompt, DEFAULT_ACTIVATION_PROMPT);
        assert_eq!(settings.match_threshold, 100);
        assert_eq!(settings.poll_interval_ms, 10);
    }

    #[test]
    fn empty_keyword_list_falls_back_to_jarvis() {
        let mut settings = AppSettings {
            wake_keywords: vec![],
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.wake_keywords, vec!["jarvis"]);
    }

    #[test]
    fn model_config_prefers_explicit_access_key() {
        let settings = AppSettings {
            access_key: Some("stored".into()),
            wake_keywords: vec!["jarvis".into(), "computer".into()],
            wake_sensitivity: 0.5,
            ..AppSettings::default()
        };
        let cfg = settings.model_config(Some("from-env".into()));
        assert_eq!(cfg.wake_word.access_key.as_deref(), Some("from-env"));
        assert_eq!(cfg.wake_word.sensitivities, vec![0.5, 0.5]);

        let cfg = settings.model_config(None);
        assert_eq!(cfg.wake_word.access_key.as_deref(), Some("stored"));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            preferred_mic_index: Some(3),
            record_seconds: 4.5,
            activation_prompt: "At your service.".into(),
            ..AppSettings::default()
        };
        save_settings(&path, &settings).expect("save settings");

        let loaded = load_settings(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_and_malformed_files_use_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{ "recordSeconds": 3.0 }"#).expect("write partial");
        let loaded = load_settings(&partial);
        assert_eq!(loaded.record_seconds, 3.0);
        assert_eq!(loaded.wake_keywords, vec!["jarvis"]);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").expect("write broken");
        assert_eq!(load_settings(&broken), AppSettings::default());

        assert_eq!(
            load_settings(&dir.path().join("missing.json")),
            AppSettings::default()
        );
    }
}
