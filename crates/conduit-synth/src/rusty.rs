//! SoundFont backend: RustySynth rendering, played out through CPAL.
//!
//! The engine and the output callback share one synthesizer behind a
//! mutex. The callback only ever `try_lock`s it and renders silence when a
//! control call holds the lock.

use crate::backend::{
    ChorusParams, Interpolation, OctaveTuning, ReverbParams, SynthBackend, SynthEngine,
};
use crate::error::{Result, SynthError};
use crate::settings::{Settings, SettingsStore};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;
const DEFAULT_POLYPHONY: i32 = 256;

struct EngineState {
    synthesizer: Option<Synthesizer>,
    soundfont: Option<Arc<SoundFont>>,
    sample_rate: i32,
    polyphony: usize,
    gain: f32,
    interpolation: Interpolation,
    reverb_on: bool,
    reverb: ReverbParams,
    chorus_on: bool,
    chorus: ChorusParams,
    tunings: Vec<OctaveTuning>,
    unapplied: Vec<&'static str>,
}

impl EngineState {
    fn synthesizer_settings(&self) -> SynthesizerSettings {
        let mut settings = SynthesizerSettings::new(self.sample_rate);
        settings.maximum_polyphony = self.polyphony;
        settings.enable_reverb_and_chorus = self.reverb_on || self.chorus_on;
        settings
    }

    /// Rebuild the synthesizer for the loaded soundfont. Sounding voices
    /// are dropped.
    fn rebuild(&mut self) -> std::result::Result<(), String> {
        let Some(soundfont) = &self.soundfont else {
            return Ok(());
        };
        let mut synthesizer = Synthesizer::new(soundfont, &self.synthesizer_settings())
            .map_err(|e| e.to_string())?;
        synthesizer.set_master_volume(self.gain);
        self.synthesizer = Some(synthesizer);
        Ok(())
    }

    /// Note a setting that is stored but has no effect on rendering.
    fn retain_only(&mut self, setting: &'static str) {
        if !self.unapplied.contains(&setting) {
            debug!(setting, "RustySynth cannot apply this setting; value retained only");
            self.unapplied.push(setting);
        }
    }

    fn midi(&mut self, channel: i32, command: i32, data1: i32, data2: i32) {
        if let Some(synthesizer) = &mut self.synthesizer {
            synthesizer.process_midi_message(channel, command, data1, data2);
        }
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        match &mut self.synthesizer {
            Some(synthesizer) => synthesizer.render(left, right),
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }
}

/// SoundFont engine. Silent until a soundfont is loaded.
///
/// Gain, MIDI and the reverb/chorus on switches reach the renderer.
/// Interpolation, reverb and chorus parameters, and octave tunings are
/// stored and readable through the accessors but do not change the output;
/// [`unapplied_settings`](Self::unapplied_settings) lists the ones set so far.
pub struct RustySynth {
    state: Arc<Mutex<EngineState>>,
}

impl RustySynth {
    fn new(sample_rate: i32, polyphony: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                synthesizer: None,
                soundfont: None,
                sample_rate,
                polyphony,
                gain: 1.0,
                interpolation: Interpolation::default(),
                reverb_on: true,
                reverb: ReverbParams::default(),
                chorus_on: true,
                chorus: ChorusParams::default(),
                tunings: Vec::new(),
                unapplied: Vec::new(),
            })),
        }
    }

    pub fn sample_rate(&self) -> i32 {
        self.state.lock().sample_rate
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().synthesizer.is_some()
    }

    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    pub fn interpolation(&self) -> Interpolation {
        self.state.lock().interpolation
    }

    pub fn reverb(&self) -> (bool, ReverbParams) {
        let state = self.state.lock();
        (state.reverb_on, state.reverb)
    }

    pub fn chorus(&self) -> (bool, ChorusParams) {
        let state = self.state.lock();
        (state.chorus_on, state.chorus)
    }

    /// Tuning for a bank/program, if one was created.
    pub fn tuning(&self, bank: i32, program: i32) -> Option<OctaveTuning> {
        self.state
            .lock()
            .tunings
            .iter()
            .find(|t| t.bank == bank && t.program == program)
            .cloned()
    }

    /// Settings written so far that are retained without affecting the
    /// rendered audio, in the order they were first set.
    pub fn unapplied_settings(&self) -> Vec<&'static str> {
        self.state.lock().unapplied.clone()
    }

    /// Render one block of stereo audio.
    pub fn render(&self, left: &mut [f32], right: &mut [f32]) {
        self.state.lock().render(left, right);
    }

    fn set_effect(&mut self, apply: impl FnOnce(&mut EngineState)) {
        let mut state = self.state.lock();
        let before = state.reverb_on || state.chorus_on;
        apply(&mut *state);
        if before != (state.reverb_on || state.chorus_on) {
            if let Err(reason) = state.rebuild() {
                warn!("Couldn't rebuild synthesizer: {}", reason);
            }
        }
    }
}

impl SynthEngine for RustySynth {
    fn sfload(&mut self, path: &Path) -> Result<()> {
        let fault = |reason: String| SynthError::SoundFont {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| fault(e.to_string()))?;
        let mut reader = BufReader::new(file);
        let soundfont = SoundFont::new(&mut reader).map_err(|e| fault(e.to_string()))?;

        let mut state = self.state.lock();
        state.soundfont = Some(Arc::new(soundfont));
        state.rebuild().map_err(fault)?;
        debug!("Loaded soundfont {}", path.display());
        Ok(())
    }

    fn preset_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .soundfont
            .as_ref()
            .map(|sf| {
                sf.get_presets()
                    .iter()
                    .map(|p| p.get_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_gain(&mut self, gain: f32) {
        let mut state = self.state.lock();
        state.gain = gain;
        if let Some(synthesizer) = &mut state.synthesizer {
            synthesizer.set_master_volume(gain);
        }
    }

    // RustySynth renders with its own fixed interpolation.
    fn set_interpolation(&mut self, method: Interpolation) {
        let mut state = self.state.lock();
        state.interpolation = method;
        state.retain_only("interpolation");
    }

    fn noteon(&mut self, channel: i32, key: i32, velocity: i32) {
        let mut state = self.state.lock();
        if let Some(synthesizer) = &mut state.synthesizer {
            synthesizer.note_on(channel, key, velocity);
        }
    }

    fn noteoff(&mut self, channel: i32, key: i32) {
        let mut state = self.state.lock();
        if let Some(synthesizer) = &mut state.synthesizer {
            synthesizer.note_off(channel, key);
        }
    }

    fn cc(&mut self, channel: i32, controller: i32, value: i32) {
        self.state.lock().midi(channel, 0xB0, controller, value);
    }

    fn pitch_bend(&mut self, channel: i32, value: i32) {
        let value = value.clamp(0, 0x3FFF);
        self.state
            .lock()
            .midi(channel, 0xE0, value & 0x7F, (value >> 7) & 0x7F);
    }

    fn program_change(&mut self, channel: i32, program: i32) {
        self.state.lock().midi(channel, 0xC0, program, 0);
    }

    fn set_reverb_on(&mut self, on: bool) {
        self.set_effect(|state| state.reverb_on = on);
    }

    fn set_reverb(&mut self, params: ReverbParams) {
        let mut state = self.state.lock();
        state.reverb = params;
        state.retain_only("reverb");
    }

    fn set_chorus_on(&mut self, on: bool) {
        self.set_effect(|state| state.chorus_on = on);
    }

    fn set_chorus(&mut self, params: ChorusParams) {
        let mut state = self.state.lock();
        state.chorus = params;
        state.retain_only("chorus");
    }

    fn create_octave_tuning(&mut self, tuning: OctaveTuning) {
        let mut state = self.state.lock();
        state
            .tunings
            .retain(|t| !(t.bank == tuning.bank && t.program == tuning.program));
        state.tunings.push(tuning);
        state.retain_only("tuning");
    }
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// The stream is created, kept and dropped by the owning synth context,
/// which is never used from two threads at once.
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: see `SendStream`; the stream is only dropped, never touched
// concurrently.
unsafe impl Send for SendStream {}

/// Audio driver playing a [`RustySynth`] out.
///
/// The `null` driver has no stream; its engine is rendered by hand.
pub struct RustyDriver {
    device: Option<String>,
    _stream: Option<SendStream>,
}

impl RustyDriver {
    /// Output device name, `None` for the `null` driver.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

/// Backend creating [`RustySynth`] engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustyBackend;

impl RustyBackend {
    pub fn new() -> Self {
        Self
    }

    fn output_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match name {
            Some(name) => host
                .output_devices()
                .map_err(engine)?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| SynthError::Engine(format!("No output device named '{name}'"))),
            None => host
                .default_output_device()
                .ok_or_else(|| SynthError::Engine("No output device available".into())),
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        state: Arc<Mutex<EngineState>>,
    ) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut left = Vec::new();
        let mut right = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let frames = data.len() / channels;
                        left.resize(frames, 0.0f32);
                        right.resize(frames, 0.0f32);

                        match state.try_lock() {
                            Some(mut state) => state.render(&mut left, &mut right),
                            None => {
                                left.fill(0.0);
                                right.fill(0.0);
                            }
                        }

                        for (i, sample) in data.iter_mut().enumerate() {
                            let value = match i % channels {
                                0 => left[i / channels],
                                1 => right[i / channels],
                                _ => 0.0,
                            };
                            *sample = T::from_sample(value);
                        }
                    }));

                    if result.is_err() {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0);
                        }
                    }
                },
                |_err| {
                    // Stream errors cannot be logged from the audio thread
                },
                None,
            )
            .map_err(engine)
    }
}

fn engine(e: impl std::fmt::Display) -> SynthError {
    SynthError::Engine(e.to_string())
}

impl SynthBackend for RustyBackend {
    type Settings = Settings;
    type Synth = RustySynth;
    type Driver = RustyDriver;

    fn new_settings(&self) -> Result<Settings> {
        Ok(Settings::new())
    }

    fn new_synth(&self, settings: &Settings) -> Result<RustySynth> {
        let rate = settings
            .get_num("synth.sample-rate")
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        let polyphony = settings
            .get_int("synth.polyphony")
            .unwrap_or(DEFAULT_POLYPHONY);

        if !(8_000.0..=192_000.0).contains(&rate) {
            return Err(SynthError::Setting {
                key: "synth.sample-rate".into(),
                reason: format!("{rate} Hz is out of range"),
            });
        }
        if polyphony < 1 {
            return Err(SynthError::Setting {
                key: "synth.polyphony".into(),
                reason: format!("{polyphony} voices"),
            });
        }

        Ok(RustySynth::new(rate as i32, polyphony as usize))
    }

    fn new_driver(&self, settings: &Settings, synth: &RustySynth) -> Result<RustyDriver> {
        let driver = settings
            .get_str("audio.driver")
            .unwrap_or_else(|| "cpal".into());

        match driver.as_str() {
            "null" => Ok(RustyDriver {
                device: None,
                _stream: None,
            }),
            "cpal" => {
                let wanted = settings.get_str("audio.cpal.device");
                let device = Self::output_device(wanted.as_deref())?;
                let name = device.name().map_err(engine)?;
                let default = device.default_output_config().map_err(engine)?;

                let period = settings.get_int("audio.period-size").unwrap_or(0);
                let config = cpal::StreamConfig {
                    channels: default.channels(),
                    sample_rate: cpal::SampleRate(synth.sample_rate() as u32),
                    buffer_size: if period > 0 {
                        cpal::BufferSize::Fixed(period as u32)
                    } else {
                        cpal::BufferSize::Default
                    },
                };

                let state = synth.state.clone();
                let stream = match default.sample_format() {
                    cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, state)?,
                    cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, state)?,
                    cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, state)?,
                    format => {
                        return Err(SynthError::Engine(format!(
                            "Unsupported sample format: {:?}",
                            format
                        )));
                    }
                };
                stream.play().map_err(engine)?;

                debug!("Synth output on '{}' at {} Hz", name, synth.sample_rate());
                Ok(RustyDriver {
                    device: Some(name),
                    _stream: Some(SendStream(stream)),
                })
            }
            other => Err(SynthError::Setting {
                key: "audio.driver".into(),
                reason: format!("unknown driver '{other}'"),
            }),
        }
    }

    fn audio_drivers(&self) -> Vec<String> {
        vec!["cpal".into(), "null".into()]
    }

    fn audio_devices(&self, driver: &str) -> Vec<String> {
        if driver != "cpal" {
            return Vec::new();
        }
        cpal::default_host()
            .output_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }
}
