//! The managed-runtime seam.
//!
//! A native audio thread cannot call into the managed side until it has
//! registered itself with the runtime. [`ManagedRuntime`] models that
//! registration plus the lookup of the per-stream [`Dispatch`] target;
//! both happen once per callback thread (see `attach.rs`).

use crate::ffi::StreamId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Failed to attach thread to runtime: {0}")]
    Attach(String),

    #[error("Failed to resolve dispatch target: {0}")]
    Resolve(String),
}

/// Managed entry points for one stream.
///
/// `callback` runs on the real-time thread once per period and must return
/// promptly. Its return value reaches the native layer unchanged: 0
/// continue, 1 complete, anything else abort.
pub trait Dispatch: Send + 'static {
    fn callback(
        &mut self,
        stream: StreamId,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> i32;

    /// The stream left active operation. Runs once per activation, after
    /// the last `callback`.
    fn finished(&mut self, stream: StreamId);
}

/// The runtime that hosts managed code.
pub trait ManagedRuntime: Send + Sync + 'static {
    type Dispatch: Dispatch;

    /// Register the calling native thread as a daemon participant.
    ///
    /// Must be a no-op on a thread that is already attached.
    fn attach_current_thread_as_daemon(&self) -> Result<(), RuntimeError>;

    /// Look up the managed entry points for `stream`.
    fn resolve_dispatch(&self, stream: StreamId) -> Result<Self::Dispatch, RuntimeError>;
}

/// A runtime with nothing to attach to: native threads call Rust directly.
///
/// Each stream gets the dispatch built by `factory`.
pub struct DirectRuntime<F> {
    factory: F,
}

impl<F> DirectRuntime<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, D> ManagedRuntime for DirectRuntime<F>
where
    F: Fn(StreamId) -> D + Send + Sync + 'static,
    D: Dispatch,
{
    type Dispatch = D;

    fn attach_current_thread_as_daemon(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn resolve_dispatch(&self, stream: StreamId) -> Result<D, RuntimeError> {
        Ok((self.factory)(stream))
    }
}
