//! The synthesizer seam.
//!
//! A [`SynthBackend`] creates the three resources a synth context owns:
//! settings, the engine, and the audio driver that plays the engine out.
//! Engine operations are thin forwarding calls with no ordering rules.

use crate::error::Result;
use crate::settings::SettingsStore;
use std::path::Path;

/// Sample interpolation used by the voice renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    None = 0,
    Linear = 1,
    #[default]
    FourthOrder = 4,
    SeventhOrder = 7,
}

impl Interpolation {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Linear),
            4 => Some(Self::FourthOrder),
            7 => Some(Self::SeventhOrder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub room_size: f64,
    pub damping: f64,
    pub width: f64,
    pub level: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.2,
            damping: 0.0,
            width: 0.5,
            level: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChorusWaveform {
    #[default]
    Sine = 0,
    Triangle = 1,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusParams {
    pub voices: i32,
    pub level: f64,
    pub speed_hz: f64,
    pub depth_ms: f64,
    pub waveform: ChorusWaveform,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            voices: 3,
            level: 2.0,
            speed_hz: 0.3,
            depth_ms: 8.0,
            waveform: ChorusWaveform::Sine,
        }
    }
}

/// A named 12-step octave tuning, in cents of deviation per pitch class.
#[derive(Debug, Clone, PartialEq)]
pub struct OctaveTuning {
    pub bank: i32,
    pub program: i32,
    pub name: String,
    pub derivations: [f64; 12],
}

/// A synthesizer engine.
pub trait SynthEngine: Send {
    /// Load a soundfont, making it the one presets are reported from.
    fn sfload(&mut self, path: &Path) -> Result<()>;

    /// Preset names of the most recently loaded soundfont.
    fn preset_names(&self) -> Vec<String>;

    fn set_gain(&mut self, gain: f32);

    fn set_interpolation(&mut self, method: Interpolation);

    fn noteon(&mut self, channel: i32, key: i32, velocity: i32);

    fn noteoff(&mut self, channel: i32, key: i32);

    fn cc(&mut self, channel: i32, controller: i32, value: i32);

    /// `value` is the 14-bit bend, 8192 centered.
    fn pitch_bend(&mut self, channel: i32, value: i32);

    fn program_change(&mut self, channel: i32, program: i32);

    fn set_reverb_on(&mut self, on: bool);

    fn set_reverb(&mut self, params: ReverbParams);

    fn set_chorus_on(&mut self, on: bool);

    fn set_chorus(&mut self, params: ChorusParams);

    fn create_octave_tuning(&mut self, tuning: OctaveTuning);
}

/// Factory for the resources of a synth context.
pub trait SynthBackend {
    type Settings: SettingsStore;
    type Synth: SynthEngine;
    type Driver: Send;

    fn new_settings(&self) -> Result<Self::Settings>;

    fn new_synth(&self, settings: &Self::Settings) -> Result<Self::Synth>;

    /// Start playing `synth` out through the driver named in `settings`.
    fn new_driver(&self, settings: &Self::Settings, synth: &Self::Synth) -> Result<Self::Driver>;

    /// Names accepted for `audio.driver`.
    fn audio_drivers(&self) -> Vec<String>;

    /// Device names accepted for `audio.<driver>.device`.
    fn audio_devices(&self, driver: &str) -> Vec<String>;
}
