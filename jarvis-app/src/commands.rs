//! Utterance → action matching.
//!
//! Recognised text is stripped of a leading assistant name ("jarvis, open the
//! browser"), lowercased and compared against every alias in the command
//! table. The best alias wins if its similarity reaches the threshold;
//! anything else gets the general-question fallback.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::settings::DEFAULT_MATCH_THRESHOLD;

/// Action id → phrase aliases.
pub type CommandTable = BTreeMap<String, Vec<String>>;

/// Names users put in front of a command.
const ASSISTANT_ALIASES: &[&str] = &["джарвис", "jarvis", "ассистент", "помощник"];

pub const FALLBACK_RESPONSE: &str =
    "I can't answer general questions yet, but I'm learning!";

/// Where an utterance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Voice,
    Text,
}

impl InputSource {
    fn as_str(self) -> &'static str {
        match self {
            InputSource::Voice => "voice",
            InputSource::Text => "text",
        }
    }
}

/// Performs a matched action and returns the reply for the user.
pub trait ActionExecutor: Send + Sync {
    fn execute(&self, action: &str, raw_text: &str) -> String;
}

pub struct CommandHandler {
    table: CommandTable,
    threshold: u32,
    executor: Box<dyn ActionExecutor>,
}

impl CommandHandler {
    pub fn new(table: CommandTable, executor: Box<dyn ActionExecutor>) -> Self {
        Self {
            table,
            threshold: DEFAULT_MATCH_THRESHOLD,
            executor,
        }
    }

    /// Minimum similarity (0-100) for a match.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.min(100);
        self
    }

    /// Best matching action and its score, if the table has any alias.
    pub fn recognize(&self, text: &str) -> Option<(&str, u32)> {
        let clean = strip_assistant_alias(text).to_lowercase();
        let mut best: Option<(&str, u32)> = None;
        for (action, aliases) in &self.table {
            for alias in aliases {
                let score = similarity(&clean, &alias.to_lowercase());
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((action.as_str(), score));
                }
            }
        }
        debug!(text, cleaned = clean.as_str(), best = ?best, "command match");
        best
    }

    /// Reply to one utterance, running the matched action if there is one.
    pub fn handle(&self, text: &str, source: InputSource) -> String {
        info!(source = source.as_str(), text, "handling command");
        match self.recognize(text) {
            Some((action, score)) if score >= self.threshold => {
                info!(action, score, "executing command");
                self.executor.execute(action, text)
            }
            _ => {
                info!("no command matched, using fallback reply");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// Remove a leading assistant name followed by a space or comma.
pub fn strip_assistant_alias(text: &str) -> &str {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    for alias in ASSISTANT_ALIASES {
        let Some(rest) = lowered.strip_prefix(alias) else {
            continue;
        };
        if !(rest.starts_with(' ') || rest.starts_with(',')) {
            continue;
        }
        let alias_chars = alias.chars().count();
        if let Some((offset, _)) = trimmed.char_indices().nth(alias_chars) {
            return trimmed[offset..].trim_start_matches([' ', ',']).trim();
        }
    }
    trimmed
}

/// Similarity of two strings on a 0-100 scale.
pub fn similarity(a: &str, b: &str) -> u32 {
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u32
}

/// Built-in table used when no command file exists.
pub fn default_command_table() -> CommandTable {
    let entries: &[(&str, &[&str])] = &[
        (
            "open_browser",
            &["open browser", "launch browser", "открой браузер"],
        ),
        ("open_youtube", &["open youtube", "открой ютуб"]),
        ("open_google", &["open google", "открой гугл"]),
        ("new_tab", &["new tab", "open new tab", "новая вкладка"]),
        ("close_browser", &["close browser", "закрой браузер"]),
        ("open_terminal", &["open terminal", "открой терминал"]),
        (
            "open_calculator",
            &["open calculator", "открой калькулятор"],
        ),
    ];
    entries
        .iter()
        .map(|(action, aliases)| {
            (
                (*action).to_string(),
                aliases.iter().map(|a| (*a).to_string()).collect(),
            )
        })
        .collect()
}

/// Parse a YAML command table.
pub fn load_command_table(path: &Path) -> anyhow::Result<CommandTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading command table {}", path.display()))?;
    let table: CommandTable = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing command table {}", path.display()))?;
    Ok(table)
}

/// Load the table at `path`; the built-in table when it is missing or invalid.
pub fn load_or_default(path: &Path) -> CommandTable {
    if !path.exists() {
        info!(path = %path.display(), "command file not found, using built-in commands");
        return default_command_table();
    }
    match load_command_table(path) {
        Ok(table) => {
            info!(commands = table.len(), "command table loaded");
            table
        }
        Err(e) => {
            warn!("{e:#}; using built-in commands");
            default_command_table()
        }
    }
}
