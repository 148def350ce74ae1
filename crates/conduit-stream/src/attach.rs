//! One-time attachment of a native callback thread to the managed runtime.
//!
//! The first period callback of an activation moves the state from
//! `Unattached` to `Attached` (or `Failed`) with a single check-and-set.
//! Later callbacks only load the state and reuse the cached dispatch.

use crate::ffi::StreamId;
use crate::runtime::{Dispatch, ManagedRuntime};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

const UNATTACHED: u8 = 0;
const ATTACHING: u8 = 1;
const ATTACHED: u8 = 2;
const FAILED: u8 = 3;

/// Observable attachment state of a stream's callback thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Unattached,
    Attaching,
    Attached,
    Failed,
}

/// Attachment flag plus the dispatch resolved for it.
///
/// `dispatch` is written only by the thread that wins the
/// `Unattached -> Attaching` transition, and read only by the callback
/// thread afterwards. The control thread touches it only through
/// [`reset`](Self::reset), while the native layer guarantees no callback
/// is in flight.
pub(crate) struct Attachment<D> {
    state: AtomicU8,
    dispatch: UnsafeCell<Option<D>>,
    attachments: AtomicU32,
}

unsafe impl<D: Send> Sync for Attachment<D> {}

impl<D: Dispatch> Attachment<D> {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(UNATTACHED),
            dispatch: UnsafeCell::new(None),
            attachments: AtomicU32::new(0),
        }
    }

    pub(crate) fn state(&self) -> AttachmentState {
        match self.state.load(Ordering::Acquire) {
            UNATTACHED => AttachmentState::Unattached,
            ATTACHING => AttachmentState::Attaching,
            ATTACHED => AttachmentState::Attached,
            _ => AttachmentState::Failed,
        }
    }

    /// Number of successful attachments over the stream's lifetime.
    pub(crate) fn attachments(&self) -> u32 {
        self.attachments.load(Ordering::Relaxed)
    }

    /// The cached dispatch, attaching on first use.
    ///
    /// Returns `None` if attachment failed for this activation.
    ///
    /// # Safety
    ///
    /// Only the stream's callback thread (or the finished hook, after the
    /// last callback) may call this.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn dispatch<R>(&self, runtime: &R, stream: StreamId) -> Option<&mut D>
    where
        R: ManagedRuntime<Dispatch = D>,
    {
        if self.state.load(Ordering::Acquire) == ATTACHED {
            return (*self.dispatch.get()).as_mut();
        }
        self.attach(runtime, stream)
    }

    #[cold]
    #[allow(clippy::mut_from_ref)]
    unsafe fn attach<R>(&self, runtime: &R, stream: StreamId) -> Option<&mut D>
    where
        R: ManagedRuntime<Dispatch = D>,
    {
        // Failed, or a second thread racing the owner of this stream.
        if self
            .state
            .compare_exchange(UNATTACHED, ATTACHING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let resolved = runtime
            .attach_current_thread_as_daemon()
            .and_then(|()| runtime.resolve_dispatch(stream));

        match resolved {
            Ok(dispatch) => {
                let slot = &mut *self.dispatch.get();
                *slot = Some(dispatch);
                self.attachments.fetch_add(1, Ordering::Relaxed);
                self.state.store(ATTACHED, Ordering::Release);
                slot.as_mut()
            }
            Err(e) => {
                tracing::error!(stream = %stream, error = %e, "Callback thread could not attach, aborting stream");
                self.state.store(FAILED, Ordering::Release);
                None
            }
        }
    }

    /// Deliver the finished notification and release the dispatch.
    ///
    /// # Safety
    ///
    /// Same as [`dispatch`](Self::dispatch); the native layer calls the
    /// finished hook after the activation's last period callback.
    pub(crate) unsafe fn finish<R>(&self, runtime: &R, stream: StreamId)
    where
        R: ManagedRuntime<Dispatch = D>,
    {
        if let Some(dispatch) = self.dispatch(runtime, stream) {
            dispatch.finished(stream);
        }
        self.reset();
    }

    /// Drop any cached dispatch and return to `Unattached`.
    ///
    /// # Safety
    ///
    /// No period callback or finished hook may be running.
    pub(crate) unsafe fn reset(&self) {
        *self.dispatch.get() = None;
        self.state.store(UNATTACHED, Ordering::Release);
    }
}
