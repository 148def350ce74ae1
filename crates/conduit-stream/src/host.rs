//! The native audio library seam.
//!
//! [`AudioHost`] is the subset of a PortAudio-style API the bridge drives.
//! Every fallible call returns the library's own status as a [`HostError`];
//! the bridge never invents native error text.

use crate::error::{codes, HostError, HostResult};
use crate::ffi::{StreamCallback, StreamFinishedCallback, StreamHandle};
use conduit_core::{HostApiKind, ResolvedStream, SampleFormat};
use std::ffi::c_void;

/// Host-local "no default device" answer.
pub const NO_DEVICE_INDEX: i32 = -1;

/// Native description of one host API.
#[derive(Debug, Clone, PartialEq)]
pub struct HostApiInfo {
    pub kind: HostApiKind,
    pub name: String,
    pub device_count: usize,
    /// Host-local index, or a negative value for none.
    pub default_input_device: i32,
    /// Host-local index, or a negative value for none.
    pub default_output_device: i32,
}

/// Native description of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub host_api: usize,
    pub max_input_channels: u32,
    pub max_output_channels: u32,
    pub default_low_input_latency: f64,
    pub default_low_output_latency: f64,
    pub default_high_input_latency: f64,
    pub default_high_output_latency: f64,
    pub default_sample_rate: f64,
}

/// A native audio I/O library.
///
/// Calls come from the control thread only. The period and finished
/// callbacks handed to [`open_stream`](Self::open_stream) are invoked by the
/// library on threads it owns.
pub trait AudioHost: Send + 'static {
    fn initialize(&self) -> HostResult<()>;

    fn terminate(&self) -> HostResult<()>;

    fn version(&self) -> i32;

    fn version_text(&self) -> String;

    fn host_api_count(&self) -> HostResult<usize>;

    fn default_host_api(&self) -> HostResult<usize>;

    fn host_api_info(&self, host_api: usize) -> HostResult<HostApiInfo>;

    /// Translate a host-local device index into a global one.
    fn host_api_device_index_to_device_index(
        &self,
        host_api: usize,
        local_index: usize,
    ) -> HostResult<usize>;

    fn device_count(&self) -> HostResult<usize>;

    fn device_info(&self, device: usize) -> HostResult<DeviceInfo>;

    /// Width in bytes of one sample of `format`.
    fn sample_size(&self, format: SampleFormat) -> HostResult<usize> {
        format
            .bytes_per_sample()
            .ok_or_else(|| HostError::from_code(codes::SAMPLE_FORMAT_NOT_SUPPORTED))
    }

    /// Succeeds if a stream with these parameters could be opened.
    fn is_format_supported(&self, stream: &ResolvedStream) -> HostResult<()>;

    /// Open a stream that calls `callback` with `user_data` once per period.
    ///
    /// # Safety
    ///
    /// `user_data` must stay valid, and must not move, until
    /// [`close_stream`](Self::close_stream) has returned for the handle.
    unsafe fn open_stream(
        &self,
        stream: &ResolvedStream,
        frames_per_buffer: u32,
        callback: StreamCallback,
        user_data: *mut c_void,
    ) -> HostResult<StreamHandle>;

    /// Install the hook fired after the last period of each activation.
    ///
    /// The hook receives the `user_data` given at open.
    fn set_stream_finished_callback(
        &self,
        stream: StreamHandle,
        callback: StreamFinishedCallback,
    ) -> HostResult<()>;

    fn start_stream(&self, stream: StreamHandle) -> HostResult<()>;

    /// Stop after pending buffers have played.
    fn stop_stream(&self, stream: StreamHandle) -> HostResult<()>;

    /// Stop immediately, discarding pending buffers.
    fn abort_stream(&self, stream: StreamHandle) -> HostResult<()>;

    /// Release the native stream. No callback runs after this returns.
    fn close_stream(&self, stream: StreamHandle) -> HostResult<()>;

    /// Fraction of the period budget spent in the callback.
    fn stream_cpu_load(&self, stream: StreamHandle) -> f64;

    /// Stream clock in seconds.
    fn stream_time(&self, stream: StreamHandle) -> f64;

    fn is_stream_active(&self, stream: StreamHandle) -> HostResult<bool>;

    fn is_stream_stopped(&self, stream: StreamHandle) -> HostResult<bool>;
}
