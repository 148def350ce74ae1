//! Error types for conduit-synth.

use core::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conduit-synth operations.
pub type Result<T> = std::result::Result<T, SynthError>;

/// Which resource of a synth context failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStage {
    Settings,
    Synth,
    Driver,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreateStage::Settings => "Couldn't create settings",
            CreateStage::Synth => "Couldn't create synth",
            CreateStage::Driver => "Couldn't create audio driver",
        })
    }
}

/// Errors that can occur in conduit-synth.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Context creation failed; anything already created was released.
    #[error("{stage}: {reason}")]
    Create { stage: CreateStage, reason: String },

    #[error("Couldn't load soundfont '{}': {reason}", path.display())]
    SoundFont { path: PathBuf, reason: String },

    #[error("Octave tuning needs 12 derivations, got {0}")]
    InvalidTuning(usize),

    #[error("Invalid setting '{key}': {reason}")]
    Setting { key: String, reason: String },

    #[error("Invalid MIDI message: {0}")]
    Midi(String),

    #[error("Synth context has been destroyed")]
    Destroyed,

    #[error("Synth engine error: {0}")]
    Engine(String),
}

impl SynthError {
    pub(crate) fn create(stage: CreateStage, cause: SynthError) -> Self {
        SynthError::Create {
            stage,
            reason: cause.to_string(),
        }
    }
}

impl From<midly::Error> for SynthError {
    fn from(e: midly::Error) -> Self {
        SynthError::Midi(e.to_string())
    }
}
