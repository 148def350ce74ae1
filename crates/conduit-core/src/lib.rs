//! Wire formats for the conduit audio bridge.
//!
//! Metadata crosses the boundary as fixed-header binary records instead of
//! field-by-field calls:
//!
//! - [`Device`] / [`HostApi`]: enumeration records, concatenated into a
//!   caller-owned [`RecordBuffer`]
//! - [`StreamConfigRecord`]: the request that opens a stream, built on the
//!   managed side with [`StreamConfiguration`] and resolved on the native
//!   side into [`StreamParameters`]
//! - [`SampleFormat`] / [`HostApiKind`]: native tag spaces

pub mod error;
pub use error::{RecordError, Result};

mod format;
pub use format::{HostApiKind, SampleFormat};

pub mod record;
pub use record::{Device, HostApi, Record, NO_DEVICE};

mod buffer;
pub use buffer::{RecordBuffer, RecordWriter, Records};

mod config;
pub use config::{
    DirectionConfig, ResolvedStream, StreamConfigRecord, StreamConfiguration, StreamMode,
    StreamParameters, STREAM_CONFIGURATION_SIZE, UNSET_DEVICE, UNSET_FORMAT,
};
