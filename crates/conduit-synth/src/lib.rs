//! Lifecycle owner for a MIDI software synthesizer.
//!
//! A [`SynthContext`] creates settings, engine and audio driver together,
//! releases whatever it already created when a later step fails, and tears
//! the three down in reverse order exactly once.
//!
//! ```ignore
//! let config = SynthConfig::new("piano").audio_driver("cpal");
//! let mut synth = SynthContext::new(RustyBackend::new(), &config)?;
//! synth.soundfont_load("GeneralUser.sf2")?;
//! synth.note_on(0, 60, 100)?;
//! ```

mod backend;
mod config;
mod context;
pub mod error;
pub mod message;
mod settings;

#[cfg(feature = "soundfont")]
mod rusty;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{
    ChorusParams, ChorusWaveform, Interpolation, OctaveTuning, ReverbParams, SynthBackend,
    SynthEngine,
};
pub use config::{OverflowWeights, SynthConfig, NAME_MAX_LENGTH};
pub use context::SynthContext;
pub use error::{CreateStage, Result, SynthError};
pub use message::{command, ShortMessage};
pub use settings::{SettingValue, Settings, SettingsStore};

#[cfg(feature = "soundfont")]
pub use rusty::{RustyBackend, RustyDriver, RustySynth};
