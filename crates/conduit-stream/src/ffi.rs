//! C-ABI types shared with the native audio library.
//!
//! Shapes match PortAudio's `PaStreamCallback`, `PaStreamFinishedCallback`
//! and `PaStreamCallbackTimeInfo`, so a PortAudio binding can hand these
//! straight through.

use core::fmt;
use core::ptr::NonNull;
use std::ffi::{c_int, c_ulong, c_void};

/// Per-period callback invoked on the native real-time thread.
pub type StreamCallback = unsafe extern "C" fn(
    input: *const c_void,
    output: *mut c_void,
    frame_count: c_ulong,
    time_info: *const StreamCallbackTimeInfo,
    status_flags: c_ulong,
    user_data: *mut c_void,
) -> c_int;

/// Fired once when the native layer retires an active stream.
pub type StreamFinishedCallback = unsafe extern "C" fn(user_data: *mut c_void);

/// Timestamps passed to every period callback, in stream-time seconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamCallbackTimeInfo {
    pub input_buffer_adc_time: f64,
    pub current_time: f64,
    pub output_buffer_dac_time: f64,
}

/// Bits of the `status_flags` callback argument.
pub mod status_flags {
    pub const INPUT_UNDERFLOW: u64 = 0x01;
    pub const INPUT_OVERFLOW: u64 = 0x02;
    pub const OUTPUT_UNDERFLOW: u64 = 0x04;
    pub const OUTPUT_OVERFLOW: u64 = 0x08;
    pub const PRIMING_OUTPUT: u64 = 0x10;
}

/// Let the native layer pick the period size.
pub const FRAMES_PER_BUFFER_UNSPECIFIED: u32 = 0;

/// Continuation decision returned from a period callback.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Continue = 0,
    Complete = 1,
    Abort = 2,
}

impl CallbackResult {
    #[inline]
    pub const fn code(self) -> c_int {
        self as c_int
    }

    /// Interpret a raw code the way the native layer does.
    ///
    /// Anything other than continue or complete stops the stream hard.
    pub const fn from_code(code: c_int) -> Self {
        match code {
            0 => Self::Continue,
            1 => Self::Complete,
            _ => Self::Abort,
        }
    }
}

/// Opaque native stream handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token. It is only ever passed back to the
// native library, which does its own synchronization.
unsafe impl Send for StreamHandle {}
unsafe impl Sync for StreamHandle {}

impl StreamHandle {
    /// Wrap a raw handle returned by the native open call.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// The stream's identity: the handle's own address.
    #[inline]
    pub fn id(self) -> StreamId {
        StreamId(self.0.as_ptr() as usize)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamHandle({:p})", self.0)
    }
}

/// Identity of an open stream, reused from its native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(usize);

impl StreamId {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
