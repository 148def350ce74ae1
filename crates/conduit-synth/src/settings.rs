//! Key/value settings consumed by a synth backend.

use crate::error::Result;
use std::collections::BTreeMap;

/// A typed setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int(i32),
    Num(f64),
    Str(String),
}

/// Settings handle of a synth backend, addressed by dotted keys such as
/// `synth.polyphony` or `audio.driver`.
pub trait SettingsStore: Send {
    fn set_int(&mut self, key: &str, value: i32) -> Result<()>;

    fn set_num(&mut self, key: &str, value: f64) -> Result<()>;

    fn set_str(&mut self, key: &str, value: &str) -> Result<()>;

    fn get(&self, key: &str) -> Option<SettingValue>;

    fn get_int(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            SettingValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value; integer settings are widened.
    fn get_num(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            SettingValue::Num(v) => Some(v),
            SettingValue::Int(v) => Some(v as f64),
            SettingValue::Str(_) => None,
        }
    }

    fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            SettingValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// In-memory settings table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn set(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }
}

impl SettingsStore for Settings {
    fn set_int(&mut self, key: &str, value: i32) -> Result<()> {
        self.set(key, SettingValue::Int(value));
        Ok(())
    }

    fn set_num(&mut self, key: &str, value: f64) -> Result<()> {
        self.set(key, SettingValue::Num(value));
        Ok(())
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<()> {
        self.set(key, SettingValue::Str(value.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).cloned()
    }
}
