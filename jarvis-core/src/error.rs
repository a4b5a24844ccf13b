use thiserror::Error;

/// All errors produced by jarvis-core.
#[derive(Debug, Error)]
pub enum JarvisError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no output device available")]
    NoOutputDevice,

    #[error("input device index {index} does not exist or has no input channels")]
    InvalidDevice { index: usize },

    #[error("wake word engine error: {0}")]
    WakeWord(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("engine has been released and cannot be restarted")]
    Released,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Device, model or collaborator failed to open. Fatal to the enable call,
    /// recoverable by retrying or reconfiguring.
    ResourceInit,
    /// Overrun or stream status warning. Logged, capture continues.
    TransientCapture,
    /// Speech-to-text, synthesis or playback failure for one utterance.
    Recognition,
    /// Invalid device selection.
    Config,
    /// Operation not permitted in the engine's current lifecycle phase.
    Lifecycle,
}

impl JarvisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JarvisError::AudioDevice(_)
            | JarvisError::NoDefaultInputDevice
            | JarvisError::NoOutputDevice
            | JarvisError::WakeWord(_)
            | JarvisError::ModelNotFound { .. }
            | JarvisError::Io(_)
            | JarvisError::Other(_) => ErrorKind::ResourceInit,
            JarvisError::AudioStream(_) => ErrorKind::TransientCapture,
            JarvisError::Recognition(_) | JarvisError::Synthesis(_) | JarvisError::Playback(_) => {
                ErrorKind::Recognition
            }
            JarvisError::InvalidDevice { .. } => ErrorKind::Config,
            JarvisError::Released => ErrorKind::Lifecycle,
        }
    }
}

pub type Result<T> = std::result::Result<T, JarvisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_init_and_config_errors() {
        assert_eq!(
            JarvisError::NoDefaultInputDevice.kind(),
            ErrorKind::ResourceInit
        );
        assert_eq!(
            JarvisError::InvalidDevice { index: 9 }.kind(),
            ErrorKind::Config
        );
        assert_eq!(
            JarvisError::Synthesis("boom".into()).kind(),
            ErrorKind::Recognition
        );
    }

    #[test]
    fn invalid_device_message_names_the_index() {
        let msg = JarvisError::InvalidDevice { index: 7 }.to_string();
        assert!(msg.contains('7'), "{msg}");
    }
}
