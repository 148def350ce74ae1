//! Device and host-API records.
//!
//! Each record is a fixed-size header followed by the name bytes, with no
//! padding and no terminator:
//!
//! ```text
//! Device   (45 + n): f64 x4 latencies (high-in, high-out, low-in, low-out),
//!                    f64 sample rate, u8 index, u8 host api,
//!                    u8 max in, u8 max out, u8 n | name[n]
//! Host API (6 + n):  i8 default in, i8 default out, u8 device count,
//!                    u8 index, u8 kind, u8 n | name[n]
//! ```
//!
//! Headers go through bincode's fixed-int encoding, which writes fields in
//! declaration order, little-endian, without padding. The header structs
//! below therefore *are* the layout; reordering their fields breaks the wire.

use crate::error::{RecordError, Result};
use crate::format::HostApiKind;
use serde::{Deserialize, Serialize};

pub const DEVICE_HEADER_SIZE: usize = 45;
pub const HOST_API_HEADER_SIZE: usize = 6;

/// Longest name a record can carry (its length field is one byte).
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Canonical "no default device" value of the host-API default fields.
pub const NO_DEVICE: i8 = -1;

/// A fixed-header + trailing-name record.
pub trait Record: Sized {
    const HEADER_SIZE: usize;

    /// Append this record to `out`.
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Decode the record starting at `offset`, returning it with the offset
    /// of the next record.
    fn decode_at(bytes: &[u8], offset: usize) -> Result<(Self, usize)>;

    /// Encoded size of this record.
    fn encoded_len(&self) -> usize;
}

#[derive(Serialize, Deserialize)]
struct DeviceHeader {
    default_high_input_latency: f64,
    default_high_output_latency: f64,
    default_low_input_latency: f64,
    default_low_output_latency: f64,
    default_sample_rate: f64,
    index: u8,
    host_api: u8,
    max_input_channels: u8,
    max_output_channels: u8,
    name_length: u8,
}

#[derive(Serialize, Deserialize)]
struct HostApiHeader {
    default_input_device: i8,
    default_output_device: i8,
    device_count: u8,
    index: u8,
    kind: u8,
    name_length: u8,
}

/// Audio device metadata as carried across the boundary.
///
/// `index` is only stable for the lifetime of the current audio-subsystem
/// initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub index: u8,
    pub host_api: u8,
    pub max_input_channels: u8,
    pub max_output_channels: u8,
    pub default_low_input_latency: f64,
    pub default_low_output_latency: f64,
    pub default_high_input_latency: f64,
    pub default_high_output_latency: f64,
    pub default_sample_rate: f64,
    pub name: String,
}

impl Record for Device {
    const HEADER_SIZE: usize = DEVICE_HEADER_SIZE;

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let name = truncate_name(&self.name);
        let header = DeviceHeader {
            default_high_input_latency: self.default_high_input_latency,
            default_high_output_latency: self.default_high_output_latency,
            default_low_input_latency: self.default_low_input_latency,
            default_low_output_latency: self.default_low_output_latency,
            default_sample_rate: self.default_sample_rate,
            index: self.index,
            host_api: self.host_api,
            max_input_channels: self.max_input_channels,
            max_output_channels: self.max_output_channels,
            name_length: name.len() as u8,
        };

        out.reserve(DEVICE_HEADER_SIZE + name.len());
        bincode::serialize_into(&mut *out, &header)?;
        out.extend_from_slice(name.as_bytes());
        Ok(())
    }

    fn decode_at(bytes: &[u8], offset: usize) -> Result<(Self, usize)> {
        let header: DeviceHeader =
            bincode::deserialize(take(bytes, offset, DEVICE_HEADER_SIZE)?)?;
        let name_offset = offset + DEVICE_HEADER_SIZE;
        let name = take(bytes, name_offset, header.name_length as usize)?;

        let device = Device {
            index: header.index,
            host_api: header.host_api,
            max_input_channels: header.max_input_channels,
            max_output_channels: header.max_output_channels,
            default_low_input_latency: header.default_low_input_latency,
            default_low_output_latency: header.default_low_output_latency,
            default_high_input_latency: header.default_high_input_latency,
            default_high_output_latency: header.default_high_output_latency,
            default_sample_rate: header.default_sample_rate,
            name: String::from_utf8_lossy(name).into_owned(),
        };
        Ok((device, name_offset + name.len()))
    }

    fn encoded_len(&self) -> usize {
        DEVICE_HEADER_SIZE + truncate_name(&self.name).len()
    }
}

/// Host API metadata as carried across the boundary.
///
/// Default devices are global device indices; `None` travels as
/// [`NO_DEVICE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostApi {
    pub index: u8,
    pub kind: HostApiKind,
    pub device_count: u8,
    pub default_input_device: Option<u8>,
    pub default_output_device: Option<u8>,
    pub name: String,
}

impl Record for HostApi {
    const HEADER_SIZE: usize = HOST_API_HEADER_SIZE;

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let name = truncate_name(&self.name);
        let header = HostApiHeader {
            default_input_device: sentinel(self.default_input_device),
            default_output_device: sentinel(self.default_output_device),
            device_count: self.device_count,
            index: self.index,
            kind: self.kind.tag(),
            name_length: name.len() as u8,
        };

        out.reserve(HOST_API_HEADER_SIZE + name.len());
        bincode::serialize_into(&mut *out, &header)?;
        out.extend_from_slice(name.as_bytes());
        Ok(())
    }

    fn decode_at(bytes: &[u8], offset: usize) -> Result<(Self, usize)> {
        let header: HostApiHeader =
            bincode::deserialize(take(bytes, offset, HOST_API_HEADER_SIZE)?)?;
        let name_offset = offset + HOST_API_HEADER_SIZE;
        let name = take(bytes, name_offset, header.name_length as usize)?;

        let host_api = HostApi {
            index: header.index,
            kind: HostApiKind::from_tag(header.kind),
            device_count: header.device_count,
            default_input_device: u8::try_from(header.default_input_device).ok(),
            default_output_device: u8::try_from(header.default_output_device).ok(),
            name: String::from_utf8_lossy(name).into_owned(),
        };
        Ok((host_api, name_offset + name.len()))
    }

    fn encoded_len(&self) -> usize {
        HOST_API_HEADER_SIZE + truncate_name(&self.name).len()
    }
}

/// Normalize a native default-device answer to the wire sentinel domain.
///
/// Anything that is not a valid global device index (the native "none",
/// a negative error code, an index past `device_count`, or one the signed
/// byte cannot hold) becomes `None`.
pub fn normalize_default_device(raw: i64, device_count: usize) -> Option<u8> {
    if raw < 0 || raw >= device_count as i64 || raw > i8::MAX as i64 {
        return None;
    }
    Some(raw as u8)
}

/// Narrow a native integer into a one-byte record field.
pub fn narrow_u8(field: &'static str, value: i64) -> Result<u8> {
    u8::try_from(value).map_err(|_| RecordError::FieldOverflow { field, value })
}

/// Longest prefix of `name` that fits a record, cut on a char boundary.
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn sentinel(device: Option<u8>) -> i8 {
    match device {
        Some(index) if index <= i8::MAX as u8 => index as i8,
        _ => NO_DEVICE,
    }
}

fn take(bytes: &[u8], offset: usize, needed: usize) -> Result<&[u8]> {
    bytes
        .get(offset..offset + needed)
        .ok_or(RecordError::Truncated {
            offset,
            needed,
            available: bytes.len().saturating_sub(offset),
        })
}
