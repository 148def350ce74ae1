//! Counting fake synth backend.
//!
//! Every resource records its creation and release in a shared event log,
//! and the engine records each call it receives.

use crate::backend::{
    ChorusParams, Interpolation, OctaveTuning, ReverbParams, SynthBackend, SynthEngine,
};
use crate::error::{Result, SynthError};
use crate::settings::{SettingValue, Settings, SettingsStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A call received by [`MockSynth`].
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    SfLoad(PathBuf),
    Gain(f32),
    Interpolation(Interpolation),
    NoteOn(i32, i32, i32),
    NoteOff(i32, i32),
    ControlChange(i32, i32, i32),
    PitchBend(i32, i32),
    ProgramChange(i32, i32),
    ReverbOn(bool),
    Reverb(ReverbParams),
    ChorusOn(bool),
    Chorus(ChorusParams),
    Tuning(OctaveTuning),
}

/// Snapshot of resource creation and release counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub settings_created: usize,
    pub settings_released: usize,
    pub synths_created: usize,
    pub synths_released: usize,
    pub drivers_created: usize,
    pub drivers_released: usize,
}

#[derive(Default)]
struct MockState {
    events: Vec<&'static str>,
    counts: ResourceCounts,
    fail_synth: bool,
    fail_driver: bool,
    rejected_key: Option<String>,
    soundfonts: HashMap<PathBuf, Vec<String>>,
}

impl MockState {
    fn record(&mut self, event: &'static str) {
        self.events.push(event);
        let c = &mut self.counts;
        match event {
            "settings+" => c.settings_created += 1,
            "settings-" => c.settings_released += 1,
            "synth+" => c.synths_created += 1,
            "synth-" => c.synths_released += 1,
            "driver+" => c.drivers_created += 1,
            "driver-" => c.drivers_released += 1,
            _ => {}
        }
    }
}

/// Fake backend sharing one event log across clones.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_synth(&self, fail: bool) {
        self.state.lock().fail_synth = fail;
    }

    pub fn fail_driver(&self, fail: bool) {
        self.state.lock().fail_driver = fail;
    }

    /// Reject any write to `key` with a `Setting` error.
    pub fn reject_setting(&self, key: impl Into<String>) {
        self.state.lock().rejected_key = Some(key.into());
    }

    /// Make `path` loadable, with these presets.
    pub fn add_soundfont(&self, path: impl Into<PathBuf>, presets: &[&str]) {
        self.state.lock().soundfonts.insert(
            path.into(),
            presets.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Creation (`+`) and release (`-`) events in order.
    pub fn events(&self) -> Vec<&'static str> {
        self.state.lock().events.clone()
    }

    pub fn counts(&self) -> ResourceCounts {
        self.state.lock().counts
    }
}

pub struct MockSettings {
    store: Settings,
    state: Arc<Mutex<MockState>>,
}

impl MockSettings {
    fn check(&self, key: &str) -> Result<()> {
        match &self.state.lock().rejected_key {
            Some(rejected) if rejected == key => Err(SynthError::Setting {
                key: key.to_string(),
                reason: "rejected".into(),
            }),
            _ => Ok(()),
        }
    }
}

impl SettingsStore for MockSettings {
    fn set_int(&mut self, key: &str, value: i32) -> Result<()> {
        self.check(key)?;
        self.store.set_int(key, value)
    }

    fn set_num(&mut self, key: &str, value: f64) -> Result<()> {
        self.check(key)?;
        self.store.set_num(key, value)
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<()> {
        self.check(key)?;
        self.store.set_str(key, value)
    }

    fn get(&self, key: &str) -> Option<SettingValue> {
        self.store.get(key)
    }
}

impl Drop for MockSettings {
    fn drop(&mut self) {
        self.state.lock().record("settings-");
    }
}

pub struct MockSynth {
    calls: Vec<SynthCall>,
    presets: Vec<String>,
    state: Arc<Mutex<MockState>>,
}

impl MockSynth {
    /// Calls received so far, excluding soundfont loads.
    pub fn calls(&self) -> Vec<SynthCall> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, SynthCall::SfLoad(_)))
            .cloned()
            .collect()
    }
}

impl SynthEngine for MockSynth {
    fn sfload(&mut self, path: &Path) -> Result<()> {
        let presets = self.state.lock().soundfonts.get(path).cloned();
        let presets = presets.ok_or_else(|| SynthError::SoundFont {
            path: path.to_path_buf(),
            reason: "No such file or directory".into(),
        })?;
        self.presets = presets;
        self.calls.push(SynthCall::SfLoad(path.to_path_buf()));
        Ok(())
    }

    fn preset_names(&self) -> Vec<String> {
        self.presets.clone()
    }

    fn set_gain(&mut self, gain: f32) {
        self.calls.push(SynthCall::Gain(gain));
    }

    fn set_interpolation(&mut self, method: Interpolation) {
        self.calls.push(SynthCall::Interpolation(method));
    }

    fn noteon(&mut self, channel: i32, key: i32, velocity: i32) {
        self.calls.push(SynthCall::NoteOn(channel, key, velocity));
    }

    fn noteoff(&mut self, channel: i32, key: i32) {
        self.calls.push(SynthCall::NoteOff(channel, key));
    }

    fn cc(&mut self, channel: i32, controller: i32, value: i32) {
        self.calls
            .push(SynthCall::ControlChange(channel, controller, value));
    }

    fn pitch_bend(&mut self, channel: i32, value: i32) {
        self.calls.push(SynthCall::PitchBend(channel, value));
    }

    fn program_change(&mut self, channel: i32, program: i32) {
        self.calls.push(SynthCall::ProgramChange(channel, program));
    }

    fn set_reverb_on(&mut self, on: bool) {
        self.calls.push(SynthCall::ReverbOn(on));
    }

    fn set_reverb(&mut self, params: ReverbParams) {
        self.calls.push(SynthCall::Reverb(params));
    }

    fn set_chorus_on(&mut self, on: bool) {
        self.calls.push(SynthCall::ChorusOn(on));
    }

    fn set_chorus(&mut self, params: ChorusParams) {
        self.calls.push(SynthCall::Chorus(params));
    }

    fn create_octave_tuning(&mut self, tuning: OctaveTuning) {
        self.calls.push(SynthCall::Tuning(tuning));
    }
}

impl Drop for MockSynth {
    fn drop(&mut self) {
        self.state.lock().record("synth-");
    }
}

pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        self.state.lock().record("driver-");
    }
}

impl SynthBackend for MockBackend {
    type Settings = MockSettings;
    type Synth = MockSynth;
    type Driver = MockDriver;

    fn new_settings(&self) -> Result<MockSettings> {
        self.state.lock().record("settings+");
        Ok(MockSettings {
            store: Settings::new(),
            state: self.state.clone(),
        })
    }

    fn new_synth(&self, _settings: &MockSettings) -> Result<MockSynth> {
        let mut state = self.state.lock();
        if state.fail_synth {
            return Err(SynthError::Engine("mock synth refused".into()));
        }
        state.record("synth+");
        Ok(MockSynth {
            calls: Vec::new(),
            presets: Vec::new(),
            state: self.state.clone(),
        })
    }

    fn new_driver(&self, _settings: &MockSettings, _synth: &MockSynth) -> Result<MockDriver> {
        let mut state = self.state.lock();
        if state.fail_driver {
            return Err(SynthError::Engine("mock driver refused".into()));
        }
        state.record("driver+");
        Ok(MockDriver {
            state: self.state.clone(),
        })
    }

    fn audio_drivers(&self) -> Vec<String> {
        vec!["mock".into(), "null".into()]
    }

    fn audio_devices(&self, driver: &str) -> Vec<String> {
        match driver {
            "mock" => vec!["mock:0".into(), "mock:1".into()],
            _ => Vec::new(),
        }
    }
}
