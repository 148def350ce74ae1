//! Synth context configuration.

use crate::error::Result;
use crate::settings::SettingsStore;
use serde::{Deserialize, Serialize};

/// Longest client name, in characters.
pub const NAME_MAX_LENGTH: usize = 32;

/// Voice-stealing weights used when polyphony runs out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverflowWeights {
    pub age: f64,
    pub percussion: f64,
    pub released: f64,
    pub sustained: f64,
    pub volume: f64,
}

impl Default for OverflowWeights {
    fn default() -> Self {
        Self {
            age: 0.5,
            percussion: 0.5,
            released: 0.5,
            sustained: 0.5,
            volume: 0.5,
        }
    }
}

/// Everything a synth context is created from.
///
/// # Example
/// ```
/// use conduit_synth::SynthConfig;
///
/// let config = SynthConfig::new("organ")
///     .polyphony(64)
///     .audio_driver("jack");
/// assert_eq!(config.midi_channels, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Client name; also the JACK client id.
    pub name: String,
    pub cpu_cores: i32,
    pub midi_channels: i32,
    pub polyphony: i32,
    pub sample_rate: f64,
    pub audio_driver: Option<String>,
    pub audio_device: Option<String>,
    /// Device index for the portaudio driver, -1 for none.
    pub device_index: i32,
    /// Number of audio buffers.
    pub buffers: i32,
    /// Frames per audio buffer.
    pub buffer_size: i32,
    pub overflow: OverflowWeights,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            cpu_cores: 1,
            midi_channels: 16,
            polyphony: 256,
            sample_rate: 44100.0,
            audio_driver: None,
            audio_device: None,
            device_index: -1,
            buffers: 8,
            buffer_size: 512,
            overflow: OverflowWeights::default(),
        }
    }
}

fn truncate_name(name: &str) -> String {
    name.chars().take(NAME_MAX_LENGTH).collect()
}

impl SynthConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: truncate_name(name),
            ..Self::default()
        }
    }

    pub fn cpu_cores(mut self, cores: i32) -> Self {
        self.cpu_cores = cores;
        self
    }

    pub fn midi_channels(mut self, channels: i32) -> Self {
        self.midi_channels = channels;
        self
    }

    pub fn polyphony(mut self, voices: i32) -> Self {
        self.polyphony = voices;
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn audio_driver(mut self, driver: &str) -> Self {
        self.audio_driver = Some(driver.to_string());
        self
    }

    pub fn audio_device(mut self, device: &str) -> Self {
        self.audio_device = Some(device.to_string());
        self
    }

    pub fn device_index(mut self, index: i32) -> Self {
        self.device_index = index;
        self
    }

    /// Buffer count and frames per buffer.
    pub fn buffers(mut self, count: i32, size: i32) -> Self {
        self.buffers = count;
        self.buffer_size = size;
        self
    }

    pub fn overflow(mut self, weights: OverflowWeights) -> Self {
        self.overflow = weights;
        self
    }

    /// Client name cut to [`NAME_MAX_LENGTH`] characters.
    pub fn client_name(&self) -> String {
        truncate_name(&self.name)
    }

    /// Write this configuration into a backend's settings.
    pub fn apply<S: SettingsStore + ?Sized>(&self, settings: &mut S) -> Result<()> {
        settings.set_int("synth.cpu-cores", self.cpu_cores)?;

        settings.set_num("synth.overflow.age", self.overflow.age)?;
        settings.set_num("synth.overflow.percussion", self.overflow.percussion)?;
        settings.set_num("synth.overflow.released", self.overflow.released)?;
        settings.set_num("synth.overflow.sustained", self.overflow.sustained)?;
        settings.set_num("synth.overflow.volume", self.overflow.volume)?;

        settings.set_int("synth.midi-channels", self.midi_channels)?;
        settings.set_int("synth.polyphony", self.polyphony)?;
        settings.set_num("synth.sample-rate", self.sample_rate)?;

        if let Some(driver) = &self.audio_driver {
            settings.set_str("audio.driver", driver)?;

            if let Some(device) = &self.audio_device {
                settings.set_str(&format!("audio.{driver}.device"), device)?;
                if driver == "portaudio" && self.device_index >= 0 {
                    settings.set_int("audio.portaudio.index", self.device_index)?;
                }
            }

            if driver == "jack" {
                settings.set_int("audio.jack.autoconnect", 1)?;
                settings.set_str("audio.jack.id", &self.client_name())?;
            }
        }

        settings.set_int("audio.periods", self.buffers)?;
        settings.set_int("audio.period-size", self.buffer_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::settings::{SettingValue, Settings};

    #[test]
    fn test_defaults() {
        let config = SynthConfig::default();
        assert_eq!(config.cpu_cores, 1);
        assert_eq!(config.midi_channels, 16);
        assert_eq!(config.polyphony, 256);
        assert_relative_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.device_index, -1);
        assert_eq!((config.buffers, config.buffer_size), (8, 512));
        assert_relative_eq!(config.overflow.volume, 0.5);
        assert!(config.audio_driver.is_none());
    }

    #[test]
    fn test_name_truncated_to_32_chars() {
        let long = "a-very-long-client-name-that-goes-on-and-on";
        let config = SynthConfig::new(long);
        assert_eq!(config.name.chars().count(), NAME_MAX_LENGTH);
        assert!(long.starts_with(&config.name));

        let wide = "ß".repeat(40);
        assert_eq!(SynthConfig::new(&wide).name.chars().count(), NAME_MAX_LENGTH);
    }

    #[test]
    fn test_apply_without_driver() {
        let mut settings = Settings::new();
        SynthConfig::new("x").apply(&mut settings).unwrap();

        assert_eq!(settings.get_int("synth.cpu-cores"), Some(1));
        assert_eq!(settings.get_num("synth.overflow.percussion"), Some(0.5));
        assert_eq!(settings.get_num("synth.sample-rate"), Some(44100.0));
        assert_eq!(settings.get_int("audio.periods"), Some(8));
        assert_eq!(settings.get_int("audio.period-size"), Some(512));
        assert_eq!(settings.get("audio.driver"), None);
        assert_eq!(settings.len(), 11);
    }

    #[test]
    fn test_apply_portaudio_device_index() {
        let mut settings = Settings::new();
        SynthConfig::new("x")
            .audio_driver("portaudio")
            .audio_device("Speakers")
            .device_index(3)
            .apply(&mut settings)
            .unwrap();

        assert_eq!(
            settings.get("audio.portaudio.device"),
            Some(SettingValue::Str("Speakers".into()))
        );
        assert_eq!(settings.get_int("audio.portaudio.index"), Some(3));
    }

    #[test]
    fn test_negative_index_not_applied() {
        let mut settings = Settings::new();
        SynthConfig::new("x")
            .audio_driver("portaudio")
            .audio_device("Speakers")
            .apply(&mut settings)
            .unwrap();
        assert_eq!(settings.get("audio.portaudio.index"), None);
    }

    #[test]
    fn test_apply_jack() {
        let mut settings = Settings::new();
        SynthConfig::new("conduit")
            .audio_driver("jack")
            .apply(&mut settings)
            .unwrap();

        assert_eq!(settings.get_str("audio.driver").as_deref(), Some("jack"));
        assert_eq!(settings.get_int("audio.jack.autoconnect"), Some(1));
        assert_eq!(settings.get_str("audio.jack.id").as_deref(), Some("conduit"));
        assert_eq!(settings.get("audio.jack.device"), None);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SynthConfig =
            serde_json::from_str(r#"{ "name": "piano", "polyphony": 32 }"#).unwrap();
        assert_eq!(config.polyphony, 32);
        assert_eq!(config.midi_channels, 16);
        assert_eq!(config.overflow, OverflowWeights::default());
    }
}
