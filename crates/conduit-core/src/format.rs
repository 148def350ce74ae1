//! Sample-format and host-API kind tags shared with the native audio library.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Native sample-format tag.
///
/// Kept as an open newtype rather than an enum: the native library owns the
/// tag space and unknown tags must pass through to it untouched, so that it
/// (not this layer) reports them as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFormat(pub u32);

impl SampleFormat {
    pub const FLOAT32: Self = Self(0x0000_0001);
    pub const INT32: Self = Self(0x0000_0002);
    pub const INT24: Self = Self(0x0000_0004);
    pub const INT16: Self = Self(0x0000_0008);
    pub const INT8: Self = Self(0x0000_0010);
    pub const UINT8: Self = Self(0x0000_0020);

    /// Every tag this crate knows a width for.
    pub const KNOWN: [Self; 6] = [
        Self::FLOAT32,
        Self::INT32,
        Self::INT24,
        Self::INT16,
        Self::INT8,
        Self::UINT8,
    ];

    #[inline]
    pub const fn tag(self) -> u32 {
        self.0
    }

    /// Width of one sample in bytes, or `None` for an unknown tag.
    pub const fn bytes_per_sample(self) -> Option<usize> {
        match self.0 {
            0x01 | 0x02 => Some(4),
            0x04 => Some(3),
            0x08 => Some(2),
            0x10 | 0x20 => Some(1),
            _ => None,
        }
    }

    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0x01 => Some("32-Bit Float"),
            0x02 => Some("32-Bit Signed Integer"),
            0x04 => Some("24-Bit Signed Integer"),
            0x08 => Some("16-Bit Signed Integer"),
            0x10 => Some("8-Bit Signed Integer"),
            0x20 => Some("8-Bit Unsigned Integer"),
            _ => None,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown sample format {:#x}", self.0),
        }
    }
}

/// Native audio backend family behind a host API.
///
/// `Other` keeps tags this crate does not know about, so a newer native
/// library never makes a host API undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostApiKind {
    InDevelopment,
    DirectSound,
    Mme,
    Asio,
    SoundManager,
    CoreAudio,
    Oss,
    Alsa,
    Al,
    BeOs,
    WdmKs,
    Jack,
    Wasapi,
    AudioScienceHpi,
    Other(u8),
}

impl HostApiKind {
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::InDevelopment,
            1 => Self::DirectSound,
            2 => Self::Mme,
            3 => Self::Asio,
            4 => Self::SoundManager,
            5 => Self::CoreAudio,
            7 => Self::Oss,
            8 => Self::Alsa,
            9 => Self::Al,
            10 => Self::BeOs,
            11 => Self::WdmKs,
            12 => Self::Jack,
            13 => Self::Wasapi,
            14 => Self::AudioScienceHpi,
            other => Self::Other(other),
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            Self::InDevelopment => 0,
            Self::DirectSound => 1,
            Self::Mme => 2,
            Self::Asio => 3,
            Self::SoundManager => 4,
            Self::CoreAudio => 5,
            Self::Oss => 7,
            Self::Alsa => 8,
            Self::Al => 9,
            Self::BeOs => 10,
            Self::WdmKs => 11,
            Self::Jack => 12,
            Self::Wasapi => 13,
            Self::AudioScienceHpi => 14,
            Self::Other(tag) => tag,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::InDevelopment => "Under Development",
            Self::DirectSound => "DirectSound",
            Self::Mme => "MultiMedia Extensions",
            Self::Asio => "ASIO",
            Self::SoundManager => "Sound Manager",
            Self::CoreAudio => "Core Audio",
            Self::Oss => "Open Sound System",
            Self::Alsa => "Advanced Linux Sound Architecture",
            Self::Al => "AL",
            Self::BeOs => "BeOS Media Kit",
            Self::WdmKs => "WDM-KS",
            Self::Jack => "JACK Audio Connection Kit",
            Self::Wasapi => "Windows Audio Session API",
            Self::AudioScienceHpi => "Audio Science HPI",
            Self::Other(_) => "Unknown",
        }
    }
}

impl fmt::Display for HostApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
