//! Real-time callback bridge between a managed runtime and a native audio
//! I/O library.
//!
//! The control thread drives streams through an [`AudioBridge`]. The native
//! library's audio thread calls back once per period; on its first callback
//! it attaches to the [`ManagedRuntime`] and resolves a [`Dispatch`], then
//! every period reaches managed code as zero-copy byte views.
//!
//! ```ignore
//! let bridge = AudioBridgeBuilder::new()
//!     .frames_per_buffer(256)
//!     .initialize(CpalHost::new(), DirectRuntime::new(|_| MyDispatch::default()))?;
//!
//! let config = bridge.default_configuration(StreamMode::OutputOnly)?;
//! let stream = bridge.open_configuration(&config)?;
//! bridge.start(stream)?;
//! ```

mod attach;
mod bridge;
mod callback;
pub mod enumerate;
pub mod error;
pub mod ffi;
mod host;
mod runtime;

#[cfg(feature = "cpal")]
mod cpal_host;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use attach::AttachmentState;
pub use bridge::{AudioBridge, AudioBridgeBuilder, StreamInfo, StreamState};
pub use error::{HostError, HostResult, Result, StreamError};
pub use ffi::{CallbackResult, StreamHandle, StreamId};
pub use host::{AudioHost, DeviceInfo, HostApiInfo, NO_DEVICE_INDEX};
pub use runtime::{DirectRuntime, Dispatch, ManagedRuntime, RuntimeError};

#[cfg(feature = "cpal")]
pub use cpal_host::CpalHost;

// Re-export the wire formats so callers need one import.
pub use conduit_core;
