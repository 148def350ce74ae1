//! The real-time callback bridge.
//!
//! The native library calls [`stream_callback`] once per period with the
//! stream's [`StreamContext`] as `user_data`. After the one-time attachment
//! each call does size arithmetic, builds zero-copy views over the native
//! buffers, and forwards the managed result code unchanged.

use crate::attach::{Attachment, AttachmentState};
use crate::ffi::{CallbackResult, StreamCallbackTimeInfo, StreamId};
use crate::runtime::{Dispatch, ManagedRuntime};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::ffi::{c_int, c_ulong, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Per-stream state shared with the native callback thread.
///
/// Lives in a `Box` owned by the bridge registry from open until close, so
/// its address (the `user_data` pointer) is stable for the native stream's
/// whole life.
pub(crate) struct StreamContext<R: ManagedRuntime> {
    runtime: Arc<R>,
    id: AtomicUsize,
    input_frame_size: usize,
    output_frame_size: usize,
    attachment: Attachment<R::Dispatch>,
    finished: AtomicU32,
}

impl<R: ManagedRuntime> StreamContext<R> {
    pub(crate) fn new(runtime: Arc<R>, input_frame_size: usize, output_frame_size: usize) -> Self {
        Self {
            runtime,
            id: AtomicUsize::new(0),
            input_frame_size,
            output_frame_size,
            attachment: Attachment::new(),
            finished: AtomicU32::new(0),
        }
    }

    /// Record the identity assigned by the native open call.
    ///
    /// Happens before the stream is started, so callbacks always see it.
    pub(crate) fn set_id(&self, id: StreamId) {
        self.id.store(id.raw(), Ordering::Release);
    }

    #[inline]
    pub(crate) fn id(&self) -> StreamId {
        StreamId::from_raw(self.id.load(Ordering::Acquire))
    }

    pub(crate) fn input_frame_size(&self) -> usize {
        self.input_frame_size
    }

    pub(crate) fn output_frame_size(&self) -> usize {
        self.output_frame_size
    }

    pub(crate) fn attachment_state(&self) -> AttachmentState {
        self.attachment.state()
    }

    pub(crate) fn attachments(&self) -> u32 {
        self.attachment.attachments()
    }

    /// Finished notifications delivered so far.
    pub(crate) fn finished_count(&self) -> u32 {
        self.finished.load(Ordering::Acquire)
    }

    /// Prepare a stopped stream for a new activation.
    ///
    /// # Safety
    ///
    /// The stream must not be active.
    pub(crate) unsafe fn reset_attachment(&self) {
        self.attachment.reset();
    }

    /// # Safety
    ///
    /// `input` must be null or valid for `frames * input_frame_size` bytes,
    /// and `output` null or valid and exclusive for
    /// `frames * output_frame_size` bytes, for the duration of the call.
    #[inline]
    unsafe fn process(&self, input: *const c_void, output: *mut c_void, frames: usize) -> c_int {
        let id = self.id();
        let Some(dispatch) = self.attachment.dispatch(&*self.runtime, id) else {
            return CallbackResult::Abort.code();
        };

        let input_size = frames * self.input_frame_size;
        let output_size = frames * self.output_frame_size;

        let input = (input_size > 0 && !input.is_null())
            .then(|| core::slice::from_raw_parts(input as *const u8, input_size));
        let output = (output_size > 0 && !output.is_null())
            .then(|| core::slice::from_raw_parts_mut(output as *mut u8, output_size));

        dispatch.callback(id, input, output)
    }

    unsafe fn finish(&self) {
        self.attachment.finish(&*self.runtime, self.id());
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}

/// Period callback installed on every stream.
///
/// # Safety
///
/// `user_data` must point at a live `StreamContext<R>`; buffer pointers must
/// satisfy the native callback contract for the stream's frame sizes.
pub(crate) unsafe extern "C" fn stream_callback<R: ManagedRuntime>(
    input: *const c_void,
    output: *mut c_void,
    frame_count: c_ulong,
    _time_info: *const StreamCallbackTimeInfo,
    _status_flags: c_ulong,
    user_data: *mut c_void,
) -> c_int {
    let context = &*(user_data as *const StreamContext<R>);

    // A panic must not unwind into the native library.
    catch_unwind(AssertUnwindSafe(|| {
        context.process(input, output, frame_count as usize)
    }))
    .unwrap_or(CallbackResult::Abort.code())
}

/// Finished hook installed on every stream.
///
/// Releases only the dispatch side; the context itself is freed by close.
///
/// # Safety
///
/// `user_data` must point at a live `StreamContext<R>`.
pub(crate) unsafe extern "C" fn stream_finished<R: ManagedRuntime>(user_data: *mut c_void) {
    let context = &*(user_data as *const StreamContext<R>);
    if catch_unwind(AssertUnwindSafe(|| context.finish())).is_err() {
        tracing::error!(stream = %context.id(), "Panic in stream finished hook");
    }
}
