//! Stream configuration record and its decoder.
//!
//! Layout (41 bytes, little-endian, no padding):
//!
//! ```text
//! f64 input latency | f64 output latency | f64 sample rate |
//! u32 input format  | u32 output format  | u32 flags       |
//! u8 mode | u8 in channels | u8 in device | u8 out channels | u8 out device
//! ```

use crate::error::{RecordError, Result};
use crate::format::SampleFormat;
use serde::{Deserialize, Serialize};

pub const STREAM_CONFIGURATION_SIZE: usize = 41;

/// Format tag written for a direction the mode disables.
pub const UNSET_FORMAT: u32 = u32::MAX;

/// Device byte written for a direction the mode disables.
pub const UNSET_DEVICE: u8 = u8::MAX;

/// Which directions a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamMode {
    InputOnly = 1,
    OutputOnly = 2,
    Duplex = 3,
}

impl StreamMode {
    /// Any tag outside the three modes is a contract violation.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::InputOnly),
            2 => Ok(Self::OutputOnly),
            3 => Ok(Self::Duplex),
            other => Err(RecordError::UnhandledMode(other)),
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn has_input(self) -> bool {
        matches!(self, Self::InputOnly | Self::Duplex)
    }

    #[inline]
    pub fn has_output(self) -> bool {
        matches!(self, Self::OutputOnly | Self::Duplex)
    }
}

/// Native parameters for one direction of a stream.
///
/// Host-specific stream extensions are never set by this layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParameters {
    pub device: u32,
    pub channel_count: u32,
    pub sample_format: SampleFormat,
    pub suggested_latency: f64,
}

/// The stream configuration record exactly as it crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamConfigRecord {
    pub input_latency: f64,
    pub output_latency: f64,
    pub sample_rate: f64,
    pub input_format: u32,
    pub output_format: u32,
    pub flags: u32,
    pub mode: u8,
    pub input_channels: u8,
    pub input_device: u8,
    pub output_channels: u8,
    pub output_device: u8,
}

impl StreamConfigRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(STREAM_CONFIGURATION_SIZE);
        bincode::serialize_into(&mut out, self)?;
        Ok(out)
    }

    /// Read a record from the start of `bytes`; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = bytes
            .get(..STREAM_CONFIGURATION_SIZE)
            .ok_or(RecordError::Truncated {
                offset: 0,
                needed: STREAM_CONFIGURATION_SIZE,
                available: bytes.len(),
            })?;
        Ok(bincode::deserialize(header)?)
    }

    pub fn mode(&self) -> Result<StreamMode> {
        StreamMode::from_tag(self.mode)
    }

    /// Resolve the record into native parameters for each enabled direction.
    ///
    /// Fields of a disabled direction are never read; its slot is `None`.
    pub fn resolve(&self) -> Result<ResolvedStream> {
        let mode = self.mode()?;

        let input = mode.has_input().then(|| StreamParameters {
            device: self.input_device as u32,
            channel_count: self.input_channels as u32,
            sample_format: SampleFormat(self.input_format),
            suggested_latency: self.input_latency,
        });
        let output = mode.has_output().then(|| StreamParameters {
            device: self.output_device as u32,
            channel_count: self.output_channels as u32,
            sample_format: SampleFormat(self.output_format),
            suggested_latency: self.output_latency,
        });

        Ok(ResolvedStream {
            mode,
            input,
            output,
            sample_rate: self.sample_rate,
            flags: self.flags,
        })
    }
}

/// Decoded stream request, ready for the native open call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedStream {
    pub mode: StreamMode,
    pub input: Option<StreamParameters>,
    pub output: Option<StreamParameters>,
    pub sample_rate: f64,
    pub flags: u32,
}

/// One direction of a [`StreamConfiguration`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionConfig {
    pub channels: u8,
    pub device: Option<u8>,
    pub format: Option<SampleFormat>,
    pub latency: f64,
}

/// Managed-side description of a desired stream.
///
/// # Example
///
/// ```
/// use conduit_core::{SampleFormat, StreamConfiguration, StreamMode};
///
/// let bytes = StreamConfiguration::new(StreamMode::OutputOnly)
///     .output_device(0)
///     .output_channels(2)
///     .output_format(SampleFormat::FLOAT32)
///     .output_latency(0.01)
///     .sample_rate(48000.0)
///     .encode()
///     .unwrap();
/// assert_eq!(bytes.len(), 41);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfiguration {
    mode: StreamMode,
    input: DirectionConfig,
    output: DirectionConfig,
    sample_rate: f64,
    flags: u32,
}

impl StreamConfiguration {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            input: DirectionConfig::default(),
            output: DirectionConfig::default(),
            sample_rate: 44100.0,
            flags: 0,
        }
    }

    pub fn input_device(mut self, device: u8) -> Self {
        self.input.device = Some(device);
        self
    }

    pub fn input_channels(mut self, channels: u8) -> Self {
        self.input.channels = channels;
        self
    }

    pub fn input_format(mut self, format: SampleFormat) -> Self {
        self.input.format = Some(format);
        self
    }

    pub fn input_latency(mut self, seconds: f64) -> Self {
        self.input.latency = seconds;
        self
    }

    pub fn output_device(mut self, device: u8) -> Self {
        self.output.device = Some(device);
        self
    }

    pub fn output_channels(mut self, channels: u8) -> Self {
        self.output.channels = channels;
        self
    }

    pub fn output_format(mut self, format: SampleFormat) -> Self {
        self.output.format = Some(format);
        self
    }

    pub fn output_latency(mut self, seconds: f64) -> Self {
        self.output.latency = seconds;
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Native driver flags, passed through untouched.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn input(&self) -> &DirectionConfig {
        &self.input
    }

    pub fn output(&self) -> &DirectionConfig {
        &self.output
    }

    pub fn get_sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Validate and build the wire record.
    pub fn to_record(&self) -> Result<StreamConfigRecord> {
        let input = self.checked(self.mode.has_input(), &self.input, "input")?;
        let output = self.checked(self.mode.has_output(), &self.output, "output")?;

        Ok(StreamConfigRecord {
            input_latency: self.input.latency,
            output_latency: self.output.latency,
            sample_rate: self.sample_rate,
            input_format: input.map_or(UNSET_FORMAT, |(_, f)| f.tag()),
            output_format: output.map_or(UNSET_FORMAT, |(_, f)| f.tag()),
            flags: self.flags,
            mode: self.mode.tag(),
            input_channels: self.input.channels,
            input_device: input.map_or(UNSET_DEVICE, |(d, _)| d),
            output_channels: self.output.channels,
            output_device: output.map_or(UNSET_DEVICE, |(d, _)| d),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_record()?.encode()
    }

    fn checked(
        &self,
        enabled: bool,
        direction: &DirectionConfig,
        label: &str,
    ) -> Result<Option<(u8, SampleFormat)>> {
        if !enabled {
            return Ok(None);
        }
        match (direction.device, direction.format) {
            (Some(device), Some(format)) => Ok(Some((device, format))),
            (None, _) => Err(RecordError::IllegalConfiguration(format!(
                "{:?} stream needs an {label} device",
                self.mode
            ))),
            (_, None) => Err(RecordError::IllegalConfiguration(format!(
                "{:?} stream needs an {label} sample format",
                self.mode
            ))),
        }
    }
}
