//! Synth context manager.
//!
//! A [`SynthContext`] owns settings, engine and driver together. Creation
//! is settings, engine, driver; teardown is the reverse and happens once.

use crate::backend::{
    ChorusParams, Interpolation, OctaveTuning, ReverbParams, SynthBackend, SynthEngine,
};
use crate::config::SynthConfig;
use crate::error::{CreateStage, Result, SynthError};
use crate::message::ShortMessage;
use std::path::Path;

struct Parts<B: SynthBackend> {
    driver: B::Driver,
    synth: B::Synth,
    settings: B::Settings,
}

/// A live synthesizer with its settings and audio driver.
pub struct SynthContext<B: SynthBackend> {
    backend: B,
    parts: Option<Parts<B>>,
}

impl<B: SynthBackend> SynthContext<B> {
    /// Create settings, engine and driver, in that order.
    ///
    /// If any step fails, everything created before it is released and the
    /// caller only sees the error.
    pub fn new(backend: B, config: &SynthConfig) -> Result<Self> {
        let mut settings = backend
            .new_settings()
            .map_err(|e| SynthError::create(CreateStage::Settings, e))?;
        if let Err(e) = config.apply(&mut settings) {
            drop(settings);
            return Err(SynthError::create(CreateStage::Settings, e));
        }

        let synth = match backend.new_synth(&settings) {
            Ok(synth) => synth,
            Err(e) => {
                drop(settings);
                return Err(SynthError::create(CreateStage::Synth, e));
            }
        };

        let driver = match backend.new_driver(&settings, &synth) {
            Ok(driver) => driver,
            Err(e) => {
                drop(synth);
                drop(settings);
                return Err(SynthError::create(CreateStage::Driver, e));
            }
        };

        tracing::info!(
            name = %config.name,
            driver = config.audio_driver.as_deref().unwrap_or("default"),
            sample_rate = config.sample_rate,
            "Synth context created"
        );

        Ok(Self {
            backend,
            parts: Some(Parts {
                driver,
                synth,
                settings,
            }),
        })
    }

    /// Release driver, engine and settings. Later calls do nothing.
    pub fn destroy(&mut self) {
        let Some(Parts {
            driver,
            synth,
            settings,
        }) = self.parts.take()
        else {
            return;
        };
        drop(driver);
        drop(synth);
        drop(settings);
        tracing::info!("Synth context destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.parts.is_none()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> Result<&B::Settings> {
        self.parts
            .as_ref()
            .map(|p| &p.settings)
            .ok_or(SynthError::Destroyed)
    }

    pub fn synth(&self) -> Result<&B::Synth> {
        self.parts
            .as_ref()
            .map(|p| &p.synth)
            .ok_or(SynthError::Destroyed)
    }

    fn synth_mut(&mut self) -> Result<&mut B::Synth> {
        self.parts
            .as_mut()
            .map(|p| &mut p.synth)
            .ok_or(SynthError::Destroyed)
    }

    pub fn soundfont_load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.synth_mut()?.sfload(path)?;
        tracing::debug!(path = %path.display(), "Loaded soundfont");
        Ok(())
    }

    pub fn preset_names(&self) -> Result<Vec<String>> {
        Ok(self.synth()?.preset_names())
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        self.synth_mut()?.set_gain(gain);
        Ok(())
    }

    pub fn set_interpolation(&mut self, method: Interpolation) -> Result<()> {
        self.synth_mut()?.set_interpolation(method);
        Ok(())
    }

    pub fn note_on(&mut self, channel: i32, key: i32, velocity: i32) -> Result<()> {
        self.synth_mut()?.noteon(channel, key, velocity);
        Ok(())
    }

    pub fn note_off(&mut self, channel: i32, key: i32) -> Result<()> {
        self.synth_mut()?.noteoff(channel, key);
        Ok(())
    }

    pub fn control_change(&mut self, channel: i32, controller: i32, value: i32) -> Result<()> {
        self.synth_mut()?.cc(channel, controller, value);
        Ok(())
    }

    pub fn pitch_bend(&mut self, channel: i32, value: i32) -> Result<()> {
        self.synth_mut()?.pitch_bend(channel, value);
        Ok(())
    }

    pub fn program_change(&mut self, channel: i32, program: i32) -> Result<()> {
        self.synth_mut()?.program_change(channel, program);
        Ok(())
    }

    pub fn set_reverb_on(&mut self, on: bool) -> Result<()> {
        self.synth_mut()?.set_reverb_on(on);
        Ok(())
    }

    pub fn set_reverb(&mut self, params: ReverbParams) -> Result<()> {
        self.synth_mut()?.set_reverb(params);
        Ok(())
    }

    pub fn set_chorus_on(&mut self, on: bool) -> Result<()> {
        self.synth_mut()?.set_chorus_on(on);
        Ok(())
    }

    pub fn set_chorus(&mut self, params: ChorusParams) -> Result<()> {
        self.synth_mut()?.set_chorus(params);
        Ok(())
    }

    /// Define a named octave tuning from exactly 12 cent deviations.
    pub fn set_tuning(
        &mut self,
        bank: i32,
        program: i32,
        name: &str,
        derivations: &[f64],
    ) -> Result<()> {
        let derivations: [f64; 12] = derivations
            .try_into()
            .map_err(|_| SynthError::InvalidTuning(derivations.len()))?;
        self.synth_mut()?.create_octave_tuning(OctaveTuning {
            bank,
            program,
            name: name.to_string(),
            derivations,
        });
        Ok(())
    }

    /// Route a MIDI short message. Commands the synth ignores are dropped.
    pub fn send(&mut self, channel: i32, command: i32, data1: i32, data2: i32) -> Result<()> {
        let synth = self.synth_mut()?;
        if let Some(message) = ShortMessage::from_parts(channel, command, data1, data2) {
            message.dispatch(synth);
        }
        Ok(())
    }

    /// Parse and route a raw MIDI message.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let synth = self.synth_mut()?;
        if let Some(message) = ShortMessage::parse(bytes)? {
            message.dispatch(synth);
        }
        Ok(())
    }

    pub fn audio_drivers(&self) -> Vec<String> {
        self.backend.audio_drivers()
    }

    pub fn audio_devices(&self, driver: &str) -> Vec<String> {
        self.backend.audio_devices(driver)
    }
}

impl<B: SynthBackend> Drop for SynthContext<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
