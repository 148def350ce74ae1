//! Error types for conduit-stream.

use crate::ffi::StreamId;
use conduit_core::RecordError;
use thiserror::Error;

/// Result type alias for control-path stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Result type alias for calls into an [`AudioHost`](crate::AudioHost).
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Native error codes, shaped after PortAudio's `PaErrorCode`.
pub mod codes {
    pub const NO_ERROR: i32 = 0;
    pub const NOT_INITIALIZED: i32 = -10000;
    pub const UNANTICIPATED_HOST_ERROR: i32 = -9999;
    pub const INVALID_CHANNEL_COUNT: i32 = -9998;
    pub const INVALID_SAMPLE_RATE: i32 = -9997;
    pub const INVALID_DEVICE: i32 = -9996;
    pub const INVALID_FLAG: i32 = -9995;
    pub const SAMPLE_FORMAT_NOT_SUPPORTED: i32 = -9994;
    pub const BAD_IO_DEVICE_COMBINATION: i32 = -9993;
    pub const INTERNAL_ERROR: i32 = -9986;
    pub const DEVICE_UNAVAILABLE: i32 = -9985;
    pub const BAD_STREAM_PTR: i32 = -9988;
    pub const STREAM_IS_STOPPED: i32 = -9983;
    pub const STREAM_IS_NOT_STOPPED: i32 = -9982;
    pub const HOST_API_NOT_FOUND: i32 = -9979;
    pub const INVALID_HOST_API: i32 = -9978;
}

/// A non-success status from the native audio library.
///
/// Displays the library's own text verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{text}")]
pub struct HostError {
    pub code: i32,
    pub text: String,
}

impl HostError {
    pub fn new(code: i32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Error carrying the library's standard text for `code`.
    pub fn from_code(code: i32) -> Self {
        Self::new(code, error_text(code))
    }
}

/// Standard descriptive text for a native error code.
pub fn error_text(code: i32) -> &'static str {
    match code {
        codes::NO_ERROR => "Success",
        codes::NOT_INITIALIZED => "PortAudio not initialized",
        codes::UNANTICIPATED_HOST_ERROR => "Unanticipated host error",
        codes::INVALID_CHANNEL_COUNT => "Invalid number of channels",
        codes::INVALID_SAMPLE_RATE => "Invalid sample rate",
        codes::INVALID_DEVICE => "Invalid device",
        codes::INVALID_FLAG => "Invalid flag",
        codes::SAMPLE_FORMAT_NOT_SUPPORTED => "Sample format not supported",
        codes::BAD_IO_DEVICE_COMBINATION => "Illegal combination of I/O devices",
        codes::INTERNAL_ERROR => "Internal PortAudio error",
        codes::DEVICE_UNAVAILABLE => "Device unavailable",
        codes::BAD_STREAM_PTR => "Invalid stream pointer",
        codes::STREAM_IS_STOPPED => "Stream is stopped",
        codes::STREAM_IS_NOT_STOPPED => "Stream is not stopped",
        codes::HOST_API_NOT_FOUND => "Host API not found",
        codes::INVALID_HOST_API => "Invalid host API",
        _ => "Invalid error code",
    }
}

/// Errors surfaced by control-path stream and enumeration operations.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("Unknown stream: {0}")]
    UnknownStream(StreamId),
}

impl StreamError {
    /// Native error code, if this is a native status fault.
    pub fn host_code(&self) -> Option<i32> {
        match self {
            StreamError::Host(e) => Some(e.code),
            _ => None,
        }
    }
}
