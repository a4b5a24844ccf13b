//! # jarvis-core
//!
//! Wake-word voice engine: microphone lifecycle, activation, command
//! recording and spoken responses.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CaptureBinding (audio thread) → SPSC FrameQueue
//!                                                   │
//!                              check_activation ◄───┤ one frame per call
//!                              record_command   ◄───┘ drains for N seconds
//!                                                   │
//!                                       SpeechRecognizer::transcribe
//!
//! speak(): suspend capture → SpeechSynthesizer → AudioOutput → resume capture
//!
//! lifecycle transitions → broadcast::Sender<EngineStatusEvent>
//! ```
//!
//! The audio callback only converts and enqueues. All detection and
//! recognition runs on the caller's thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod detect;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod recognize;
pub mod speech;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Convenience re-exports for downstream crates
pub use audio::{AudioBackend, CpalBackend, DeviceInfo};
pub use engine::{EngineConfig, EngineState, VoiceEngine, DEFAULT_RECORD_DURATION};
pub use error::{ErrorKind, JarvisError};
pub use events::{EngineStatus, EngineStatusEvent};
pub use models::{BuiltinLoader, ModelConfig, ModelLoader};
