//! Stream lifecycle manager.
//!
//! [`AudioBridge`] is the explicit context object for one initialization of
//! the native library: it owns the host, the managed runtime, and every open
//! stream's [`StreamContext`]. Streams are addressed by their native handle.

use crate::attach::AttachmentState;
use crate::callback::{stream_callback, stream_finished, StreamContext};
use crate::enumerate;
use crate::error::{Result, StreamError};
use crate::ffi::{StreamHandle, StreamId, FRAMES_PER_BUFFER_UNSPECIFIED};
use crate::host::AudioHost;
use crate::runtime::ManagedRuntime;
use conduit_core::{
    Device, HostApi, RecordBuffer, ResolvedStream, StreamConfigRecord, StreamConfiguration,
    StreamMode, StreamParameters,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

/// Local view of where a stream is in its lifecycle.
///
/// Transitions are recorded after the native call succeeds. Ordering rules
/// are left to the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Started,
    Stopped,
    Aborted,
}

/// Snapshot of an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub mode: StreamMode,
    pub input_frame_size: usize,
    pub output_frame_size: usize,
    pub state: StreamState,
    pub attachment: AttachmentState,
    /// Callback-thread attachments performed so far.
    pub attachments: u32,
    /// Finished notifications delivered so far.
    pub finished: u32,
}

struct StreamEntry<R: ManagedRuntime> {
    handle: StreamHandle,
    mode: StreamMode,
    state: StreamState,
    context: Box<StreamContext<R>>,
}

/// Builder for [`AudioBridge`].
#[derive(Debug)]
pub struct AudioBridgeBuilder {
    frames_per_buffer: u32,
}

impl Default for AudioBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridgeBuilder {
    pub fn new() -> Self {
        Self {
            frames_per_buffer: FRAMES_PER_BUFFER_UNSPECIFIED,
        }
    }

    /// Period size requested for every stream (default: unspecified).
    pub fn frames_per_buffer(mut self, frames: u32) -> Self {
        self.frames_per_buffer = frames;
        self
    }

    /// Initialize the native library and take ownership of it.
    pub fn initialize<H: AudioHost, R: ManagedRuntime>(
        self,
        host: H,
        runtime: R,
    ) -> Result<AudioBridge<H, R>> {
        host.initialize()?;
        tracing::info!(version = %host.version_text(), "Audio host initialized");

        Ok(AudioBridge {
            host,
            runtime: Arc::new(runtime),
            streams: Mutex::new(HashMap::new()),
            frames_per_buffer: self.frames_per_buffer,
            terminated: false,
        })
    }
}

/// One initialization of the native audio library.
///
/// Dropping the bridge closes any remaining streams and terminates the
/// library, as [`terminate`](Self::terminate) does.
pub struct AudioBridge<H: AudioHost, R: ManagedRuntime> {
    host: H,
    runtime: Arc<R>,
    streams: Mutex<HashMap<StreamId, StreamEntry<R>>>,
    frames_per_buffer: u32,
    terminated: bool,
}

impl<H: AudioHost, R: ManagedRuntime> AudioBridge<H, R> {
    /// Initialize with default settings.
    pub fn initialize(host: H, runtime: R) -> Result<Self> {
        AudioBridgeBuilder::new().initialize(host, runtime)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn frames_per_buffer(&self) -> u32 {
        self.frames_per_buffer
    }

    pub fn version(&self) -> i32 {
        self.host.version()
    }

    pub fn version_text(&self) -> String {
        self.host.version_text()
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    pub fn host_apis(&self) -> Result<RecordBuffer<HostApi>> {
        enumerate::host_apis(&self.host)
    }

    pub fn host_api(&self, index: usize) -> Result<RecordBuffer<HostApi>> {
        enumerate::host_api(&self.host, index)
    }

    pub fn default_host_api(&self) -> Result<RecordBuffer<HostApi>> {
        enumerate::default_host_api(&self.host)
    }

    pub fn devices(&self) -> Result<RecordBuffer<Device>> {
        enumerate::devices(&self.host)
    }

    pub fn device(&self, index: usize) -> Result<RecordBuffer<Device>> {
        enumerate::device(&self.host, index)
    }

    pub fn host_api_devices(&self, host_api: usize) -> Result<RecordBuffer<Device>> {
        enumerate::host_api_devices(&self.host, host_api)
    }

    pub fn default_configuration(&self, mode: StreamMode) -> Result<StreamConfiguration> {
        enumerate::default_configuration(&self.host, mode)
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Succeeds if a stream with this configuration record could be opened.
    pub fn is_format_supported(&self, config: &[u8]) -> Result<()> {
        let resolved = StreamConfigRecord::decode(config)?.resolve()?;
        Ok(self.host.is_format_supported(&resolved)?)
    }

    /// Open a stream from an encoded configuration record.
    ///
    /// On any failure nothing stays open.
    pub fn open(&self, config: &[u8]) -> Result<StreamId> {
        let resolved = StreamConfigRecord::decode(config)?.resolve()?;
        self.open_resolved(&resolved)
    }

    /// Open a stream from a configuration built in-process.
    pub fn open_configuration(&self, config: &StreamConfiguration) -> Result<StreamId> {
        self.open(&config.encode()?)
    }

    fn open_resolved(&self, resolved: &ResolvedStream) -> Result<StreamId> {
        let input_frame_size = self.frame_size(resolved.input.as_ref())?;
        let output_frame_size = self.frame_size(resolved.output.as_ref())?;

        let context = Box::new(StreamContext::new(
            self.runtime.clone(),
            input_frame_size,
            output_frame_size,
        ));
        let user_data = &*context as *const StreamContext<R> as *mut c_void;

        // SAFETY: the boxed context is kept in `streams` until close_stream
        // has returned for this handle, and a Box never moves its contents.
        let handle = unsafe {
            self.host.open_stream(
                resolved,
                self.frames_per_buffer,
                stream_callback::<R>,
                user_data,
            )?
        };

        let id = handle.id();
        context.set_id(id);

        if let Err(e) = self
            .host
            .set_stream_finished_callback(handle, stream_finished::<R>)
        {
            if let Err(close_err) = self.host.close_stream(handle) {
                // Still open natively: keep it registered so close or
                // terminate can release it later.
                tracing::warn!(stream = %id, error = %close_err, "Failed to close stream after finished-hook failure");
                self.streams.lock().insert(
                    id,
                    StreamEntry {
                        handle,
                        mode: resolved.mode,
                        state: StreamState::Open,
                        context,
                    },
                );
            }
            return Err(e.into());
        }

        tracing::debug!(
            stream = %id,
            mode = ?resolved.mode,
            input_frame_size,
            output_frame_size,
            sample_rate = resolved.sample_rate,
            "Opened stream"
        );

        self.streams.lock().insert(
            id,
            StreamEntry {
                handle,
                mode: resolved.mode,
                state: StreamState::Open,
                context,
            },
        );
        Ok(id)
    }

    fn frame_size(&self, params: Option<&StreamParameters>) -> Result<usize> {
        match params {
            Some(p) => Ok(self.host.sample_size(p.sample_format)? * p.channel_count as usize),
            None => Ok(0),
        }
    }

    pub fn start(&self, id: StreamId) -> Result<()> {
        self.with_stream(id, |host, entry| {
            if matches!(entry.state, StreamState::Stopped | StreamState::Aborted) {
                // SAFETY: stopped and aborted streams have no callback in
                // flight; the native layer quiesced them before returning.
                unsafe { entry.context.reset_attachment() };
            }
            host.start_stream(entry.handle)?;
            entry.state = StreamState::Started;
            Ok(())
        })
    }

    /// Stop after pending buffers have played.
    pub fn stop(&self, id: StreamId) -> Result<()> {
        self.with_stream(id, |host, entry| {
            host.stop_stream(entry.handle)?;
            entry.state = StreamState::Stopped;
            Ok(())
        })
    }

    /// Stop immediately without waiting for pending buffers.
    pub fn abort(&self, id: StreamId) -> Result<()> {
        self.with_stream(id, |host, entry| {
            host.abort_stream(entry.handle)?;
            entry.state = StreamState::Aborted;
            Ok(())
        })
    }

    /// Close the stream and release its context.
    ///
    /// A second close of the same id is an [`StreamError::UnknownStream`]
    /// and never reaches the native layer.
    pub fn close(&self, id: StreamId) -> Result<()> {
        let mut streams = self.streams.lock();
        let entry = streams.get(&id).ok_or(StreamError::UnknownStream(id))?;
        self.host.close_stream(entry.handle)?;

        // No callback or finished hook can run now, so the context can go.
        streams.remove(&id);
        tracing::debug!(stream = %id, "Closed stream");
        Ok(())
    }

    pub fn cpu_load(&self, id: StreamId) -> Result<f64> {
        self.with_stream(id, |host, entry| Ok(host.stream_cpu_load(entry.handle)))
    }

    /// Stream clock in seconds.
    pub fn time(&self, id: StreamId) -> Result<f64> {
        self.with_stream(id, |host, entry| Ok(host.stream_time(entry.handle)))
    }

    pub fn is_active(&self, id: StreamId) -> Result<bool> {
        self.with_stream(id, |host, entry| Ok(host.is_stream_active(entry.handle)?))
    }

    pub fn is_stopped(&self, id: StreamId) -> Result<bool> {
        self.with_stream(id, |host, entry| Ok(host.is_stream_stopped(entry.handle)?))
    }

    pub fn info(&self, id: StreamId) -> Result<StreamInfo> {
        self.with_stream(id, |_, entry| {
            Ok(StreamInfo {
                id,
                mode: entry.mode,
                input_frame_size: entry.context.input_frame_size(),
                output_frame_size: entry.context.output_frame_size(),
                state: entry.state,
                attachment: entry.context.attachment_state(),
                attachments: entry.context.attachments(),
                finished: entry.context.finished_count(),
            })
        })
    }

    /// Ids of every open stream.
    pub fn streams(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    fn with_stream<T>(
        &self,
        id: StreamId,
        f: impl FnOnce(&H, &mut StreamEntry<R>) -> Result<T>,
    ) -> Result<T> {
        let mut streams = self.streams.lock();
        let entry = streams
            .get_mut(&id)
            .ok_or(StreamError::UnknownStream(id))?;
        f(&self.host, entry)
    }

    /// Close remaining streams and terminate the native library.
    pub fn terminate(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        let mut streams = self.streams.lock();
        for (id, entry) in streams.drain() {
            if let Err(e) = self.host.close_stream(entry.handle) {
                // The native stream may still reference the context.
                tracing::warn!(stream = %id, error = %e, "Failed to close stream during terminate");
                std::mem::forget(entry.context);
            }
        }
        drop(streams);

        self.host.terminate()?;
        tracing::info!("Audio host terminated");
        Ok(())
    }
}

impl<H: AudioHost, R: ManagedRuntime> Drop for AudioBridge<H, R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Failed to terminate audio host");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::mock::{MockDevice, MockHost, MockHostApi, MockOp, MockRuntime};
    use conduit_core::{HostApiKind, RecordError, SampleFormat};

    fn host() -> MockHost {
        let host = MockHost::new();
        host.add_host_api(MockHostApi::new(HostApiKind::Alsa, "ALSA").defaults(0, 0));
        host.add_device(0, MockDevice::new("hw:0,0", 2, 2));
        host
    }

    fn bridge(host: &MockHost, runtime: &MockRuntime) -> AudioBridge<MockHost, MockRuntime> {
        AudioBridgeBuilder::new()
            .frames_per_buffer(128)
            .initialize(host.clone(), runtime.clone())
            .unwrap()
    }

    fn duplex() -> StreamConfiguration {
        StreamConfiguration::new(StreamMode::Duplex)
            .input_device(0)
            .input_channels(2)
            .input_format(SampleFormat::INT32)
            .output_device(0)
            .output_channels(2)
            .output_format(SampleFormat::FLOAT32)
            .sample_rate(48000.0)
    }

    #[test]
    fn test_default_builder_leaves_period_unspecified() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = AudioBridgeBuilder::default()
            .initialize(host.clone(), runtime.clone())
            .unwrap();

        let id = bridge.open_configuration(&duplex()).unwrap();
        assert_eq!(bridge.frames_per_buffer(), FRAMES_PER_BUFFER_UNSPECIFIED);
        assert_eq!(host.frames_per_buffer(id), Some(FRAMES_PER_BUFFER_UNSPECIFIED));
    }

    #[test]
    fn test_open_computes_frame_sizes() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        let config = StreamConfiguration::new(StreamMode::InputOnly)
            .input_device(0)
            .input_channels(2)
            .input_format(SampleFormat::INT16);
        let id = bridge.open_configuration(&config).unwrap();

        let info = bridge.info(id).unwrap();
        assert_eq!(info.input_frame_size, 4);
        assert_eq!(info.output_frame_size, 0);
        assert_eq!(info.state, StreamState::Open);
        assert_eq!(info.attachment, AttachmentState::Unattached);
        assert_eq!(host.calls().opens, 1);
        assert_eq!(host.frames_per_buffer(id), Some(128));
    }

    #[test]
    fn test_lifecycle_states() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let id = bridge.open_configuration(&duplex()).unwrap();

        bridge.start(id).unwrap();
        assert_eq!(bridge.info(id).unwrap().state, StreamState::Started);
        assert!(bridge.is_active(id).unwrap());

        bridge.stop(id).unwrap();
        assert_eq!(bridge.info(id).unwrap().state, StreamState::Stopped);
        assert!(bridge.is_stopped(id).unwrap());

        bridge.start(id).unwrap();
        bridge.abort(id).unwrap();
        assert_eq!(bridge.info(id).unwrap().state, StreamState::Aborted);

        bridge.close(id).unwrap();
        assert!(bridge.streams().is_empty());
    }

    #[test]
    fn test_double_close_does_not_double_release() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let id = bridge.open_configuration(&duplex()).unwrap();

        bridge.close(id).unwrap();
        let err = bridge.close(id).unwrap_err();
        assert!(matches!(err, StreamError::UnknownStream(other) if other == id));
        assert_eq!(host.calls().closes, 1);
    }

    #[test]
    fn test_out_of_order_calls_are_native_faults() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let id = bridge.open_configuration(&duplex()).unwrap();

        let err = bridge.stop(id).unwrap_err();
        assert_eq!(err.host_code(), Some(codes::STREAM_IS_STOPPED));
        assert_eq!(err.to_string(), "Stream is stopped");
        assert_eq!(bridge.info(id).unwrap().state, StreamState::Open);
    }

    #[test]
    fn test_unhandled_mode_is_rejected() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        let mut record = duplex().to_record().unwrap();
        record.mode = 4;
        let err = bridge.open(&record.encode().unwrap()).unwrap_err();
        assert!(matches!(err, StreamError::Record(RecordError::UnhandledMode(4))));
        assert_eq!(host.calls().opens, 0);
    }

    #[test]
    fn test_failed_open_leaves_nothing_open() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        host.fail_next(MockOp::Open, codes::DEVICE_UNAVAILABLE);
        let err = bridge.open_configuration(&duplex()).unwrap_err();
        assert_eq!(err.to_string(), "Device unavailable");
        assert!(bridge.streams().is_empty());
        assert_eq!(host.live_streams(), 0);
    }

    #[test]
    fn test_finished_hook_failure_closes_native_stream() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        host.fail_next(MockOp::SetFinishedCallback, codes::INTERNAL_ERROR);
        assert!(bridge.open_configuration(&duplex()).is_err());

        let calls = host.calls();
        assert_eq!(calls.opens, 1);
        assert_eq!(calls.closes, 1);
        assert_eq!(host.live_streams(), 0);
        assert!(bridge.streams().is_empty());
    }

    #[test]
    fn test_unclosable_stream_stays_registered_until_terminate() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        host.fail_next(MockOp::SetFinishedCallback, codes::INTERNAL_ERROR);
        host.fail_next(MockOp::Close, codes::INTERNAL_ERROR);
        assert!(bridge.open_configuration(&duplex()).is_err());

        assert_eq!(host.live_streams(), 1);
        assert_eq!(bridge.streams().len(), 1);

        bridge.terminate().unwrap();
        assert_eq!(host.live_streams(), 0);
        assert_eq!(host.calls().closes, 1);
        assert_eq!(host.calls().terminates, 1);
    }

    #[test]
    fn test_unsupported_sample_format() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);

        let config = StreamConfiguration::new(StreamMode::OutputOnly)
            .output_device(0)
            .output_channels(2)
            .output_format(SampleFormat(0x40));
        let err = bridge.open_configuration(&config).unwrap_err();
        assert_eq!(err.host_code(), Some(codes::SAMPLE_FORMAT_NOT_SUPPORTED));
        assert_eq!(host.calls().opens, 0);

        let err = bridge.is_format_supported(&config.encode().unwrap()).unwrap_err();
        assert_eq!(err.host_code(), Some(codes::SAMPLE_FORMAT_NOT_SUPPORTED));
        assert!(bridge.is_format_supported(&duplex().encode().unwrap()).is_ok());
    }

    #[test]
    fn test_restart_reattaches_callback_thread() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let id = bridge.open_configuration(&duplex()).unwrap();

        bridge.start(id).unwrap();
        host.drive(id, 3, 64);
        bridge.stop(id).unwrap();

        bridge.start(id).unwrap();
        host.drive(id, 3, 64);
        bridge.stop(id).unwrap();

        let info = bridge.info(id).unwrap();
        assert_eq!(info.attachments, 2);
        assert_eq!(info.finished, 2);
        assert_eq!(runtime.calls().resolves, 2);
        assert_eq!(runtime.calls().dispatches, 6);
    }

    #[test]
    fn test_unknown_stream_never_reaches_host() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let id = StreamId::from_raw(0xdead);

        assert!(matches!(bridge.start(id), Err(StreamError::UnknownStream(_))));
        assert!(matches!(bridge.cpu_load(id), Err(StreamError::UnknownStream(_))));
        assert_eq!(host.calls().starts, 0);
    }

    #[test]
    fn test_terminate_closes_remaining_streams() {
        let (host, runtime) = (host(), MockRuntime::new());
        let bridge = bridge(&host, &runtime);
        let a = bridge.open_configuration(&duplex()).unwrap();
        bridge.open_configuration(&duplex()).unwrap();
        bridge.start(a).unwrap();

        bridge.terminate().unwrap();
        let calls = host.calls();
        assert_eq!(calls.closes, 2);
        assert_eq!(calls.terminates, 1);
        assert_eq!(calls.finished_fired, 1);
    }

    #[test]
    fn test_drop_terminates_once() {
        let (host, runtime) = (host(), MockRuntime::new());
        {
            let bridge = bridge(&host, &runtime);
            bridge.open_configuration(&duplex()).unwrap();
        }
        let calls = host.calls();
        assert_eq!(calls.initializes, 1);
        assert_eq!(calls.closes, 1);
        assert_eq!(calls.terminates, 1);
    }
}
