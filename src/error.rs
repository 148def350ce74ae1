//! Centralized error type for the conduit umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Record(#[from] conduit_core::RecordError),

    #[error(transparent)]
    Stream(#[from] conduit_stream::StreamError),

    #[error("Synth: {0}")]
    Synth(#[from] conduit_synth::SynthError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Native error code, when the failure came from the audio host.
    pub fn host_code(&self) -> Option<i32> {
        match self {
            Error::Stream(e) => e.host_code(),
            _ => None,
        }
    }
}

impl From<conduit_stream::HostError> for Error {
    fn from(e: conduit_stream::HostError) -> Self {
        Error::Stream(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
