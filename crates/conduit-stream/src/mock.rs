//! In-process fake host and runtime.
//!
//! [`MockHost`] keeps devices and streams in memory, counts every native
//! call, and runs period callbacks on a thread of its own through
//! [`MockHost::drive`]. [`MockRuntime`] counts attachments, resolutions and
//! dispatches, and copies input into output so tests can see the views land
//! in native memory.

use crate::error::{codes, HostError, HostResult};
use crate::ffi::{
    StreamCallback, StreamCallbackTimeInfo, StreamFinishedCallback, StreamHandle, StreamId,
};
use crate::host::{AudioHost, DeviceInfo, HostApiInfo, NO_DEVICE_INDEX};
use crate::runtime::{Dispatch, ManagedRuntime, RuntimeError};
use conduit_core::{HostApiKind, ResolvedStream, StreamParameters};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_ulong, c_void};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

const FIRST_HANDLE: usize = 0x1000;

/// Native operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Initialize,
    Open,
    SetFinishedCallback,
    Start,
    Stop,
    Abort,
    Close,
}

/// Snapshot of native call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCalls {
    pub initializes: usize,
    pub terminates: usize,
    pub opens: usize,
    pub closes: usize,
    pub starts: usize,
    pub stops: usize,
    pub aborts: usize,
    pub periods: usize,
    pub finished_fired: usize,
}

/// Host API description for [`MockHost::add_host_api`].
#[derive(Debug, Clone)]
pub struct MockHostApi {
    kind: HostApiKind,
    name: String,
    default_input: i32,
    default_output: i32,
    devices: Vec<usize>,
}

impl MockHostApi {
    pub fn new(kind: HostApiKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            default_input: NO_DEVICE_INDEX,
            default_output: NO_DEVICE_INDEX,
            devices: Vec::new(),
        }
    }

    /// Host-local default input and output device indices.
    pub fn defaults(mut self, input: i32, output: i32) -> Self {
        self.default_input = input;
        self.default_output = output;
        self
    }
}

/// Device description for [`MockHost::add_device`].
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    max_input_channels: u32,
    max_output_channels: u32,
    sample_rate: f64,
    low_latency: f64,
    high_latency: f64,
}

impl MockDevice {
    pub fn new(name: impl Into<String>, max_input_channels: u32, max_output_channels: u32) -> Self {
        Self {
            name: name.into(),
            max_input_channels,
            max_output_channels,
            sample_rate: 44100.0,
            low_latency: 0.005,
            high_latency: 0.04,
        }
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn latency(mut self, low: f64, high: f64) -> Self {
        self.low_latency = low;
        self.high_latency = high;
        self
    }
}

#[derive(Clone, Copy)]
struct MockStream {
    callback: StreamCallback,
    user_data: usize,
    finished: Option<StreamFinishedCallback>,
    input_frame_size: usize,
    output_frame_size: usize,
    frames_per_buffer: u32,
    active: bool,
    stopped: bool,
    started_at: Option<Instant>,
}

#[derive(Default)]
struct HostState {
    initialized: bool,
    host_apis: Vec<MockHostApi>,
    devices: Vec<(usize, MockDevice)>,
    default_host_api: usize,
    translations: HashMap<(usize, usize), usize>,
    streams: HashMap<usize, MockStream>,
    next_handle: usize,
    failures: HashMap<MockOp, i32>,
    calls: HostCalls,
    cpu_load: f64,
    last_output: Vec<u8>,
}

/// Fake native audio library.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host API, returning its index.
    pub fn add_host_api(&self, api: MockHostApi) -> usize {
        let mut state = self.state.lock();
        state.host_apis.push(api);
        state.host_apis.len() - 1
    }

    /// Add a device to `host_api`, returning its global index.
    pub fn add_device(&self, host_api: usize, device: MockDevice) -> usize {
        let mut state = self.state.lock();
        let index = state.devices.len();
        state.devices.push((host_api, device));
        if let Some(api) = state.host_apis.get_mut(host_api) {
            api.devices.push(index);
        }
        index
    }

    pub fn set_default_host_api(&self, index: usize) {
        self.state.lock().default_host_api = index;
    }

    /// Make the host-local to global translation answer `global`.
    pub fn set_translation_override(&self, host_api: usize, local: usize, global: usize) {
        self.state
            .lock()
            .translations
            .insert((host_api, local), global);
    }

    /// Fail the next `op` with `code`.
    pub fn fail_next(&self, op: MockOp, code: i32) {
        self.state.lock().failures.insert(op, code);
    }

    pub fn set_cpu_load(&self, load: f64) {
        self.state.lock().cpu_load = load;
    }

    pub fn calls(&self) -> HostCalls {
        self.state.lock().calls
    }

    /// Native streams opened and not yet closed.
    pub fn live_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    pub fn frames_per_buffer(&self, stream: StreamId) -> Option<u32> {
        self.state
            .lock()
            .streams
            .get(&stream.raw())
            .map(|s| s.frames_per_buffer)
    }

    /// Output buffer as left by the last driven period.
    pub fn last_output(&self) -> Vec<u8> {
        self.state.lock().last_output.clone()
    }

    /// Run up to `periods` callbacks of `frames` frames on a fresh thread.
    ///
    /// Input carries a repeating byte ramp. A non-continue result ends the
    /// activation and fires the finished hook from the callback thread, as a
    /// real host does. Returns each callback's result code.
    pub fn drive(&self, stream: StreamId, periods: usize, frames: usize) -> Vec<i32> {
        let Some(s) = self
            .state
            .lock()
            .streams
            .get(&stream.raw())
            .copied()
            .filter(|s| s.active)
        else {
            return Vec::new();
        };

        let host = self.clone();
        let worker = thread::spawn(move || {
            let input: Vec<u8> = (0..frames * s.input_frame_size)
                .map(|i| (i % 251) as u8)
                .collect();
            let mut output = vec![0u8; frames * s.output_frame_size];
            let in_ptr = if input.is_empty() {
                std::ptr::null()
            } else {
                input.as_ptr() as *const c_void
            };
            let out_ptr = if output.is_empty() {
                std::ptr::null_mut()
            } else {
                output.as_mut_ptr() as *mut c_void
            };

            let mut results = Vec::with_capacity(periods);
            for period in 0..periods {
                let time = StreamCallbackTimeInfo {
                    current_time: period as f64 * frames as f64 / 44100.0,
                    ..Default::default()
                };
                let code = unsafe {
                    (s.callback)(
                        in_ptr,
                        out_ptr,
                        frames as c_ulong,
                        &time,
                        0,
                        s.user_data as *mut c_void,
                    )
                };
                results.push(code);
                host.state.lock().calls.periods += 1;
                if code != 0 {
                    host.retire(stream.raw(), false);
                    break;
                }
            }
            host.state.lock().last_output = output;
            results
        });
        worker.join().unwrap_or_default()
    }

    fn take_failure(&self, op: MockOp) -> HostResult<()> {
        match self.state.lock().failures.remove(&op) {
            Some(code) => Err(HostError::from_code(code)),
            None => Ok(()),
        }
    }

    /// End the current activation, firing the finished hook once.
    fn retire(&self, handle: usize, stopped: bool) {
        let hook = {
            let mut state = self.state.lock();
            let Some(stream) = state.streams.get_mut(&handle) else {
                return;
            };
            let was_active = stream.active;
            stream.active = false;
            stream.stopped |= stopped;
            let hook = was_active
                .then_some(stream.finished.map(|f| (f, stream.user_data)))
                .flatten();
            if hook.is_some() {
                state.calls.finished_fired += 1;
            }
            hook
        };
        if let Some((finished, user_data)) = hook {
            unsafe { finished(user_data as *mut c_void) };
        }
    }

    fn check_direction(
        state: &HostState,
        params: &StreamParameters,
        input: bool,
    ) -> HostResult<usize> {
        let (_, device) = state
            .devices
            .get(params.device as usize)
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))?;
        let max = if input {
            device.max_input_channels
        } else {
            device.max_output_channels
        };
        if params.channel_count == 0 || params.channel_count > max {
            return Err(HostError::from_code(codes::INVALID_CHANNEL_COUNT));
        }
        let width = params
            .sample_format
            .bytes_per_sample()
            .ok_or_else(|| HostError::from_code(codes::SAMPLE_FORMAT_NOT_SUPPORTED))?;
        Ok(width * params.channel_count as usize)
    }

    fn check_stream(state: &HostState, stream: &ResolvedStream) -> HostResult<(usize, usize)> {
        if stream.sample_rate <= 0.0 {
            return Err(HostError::from_code(codes::INVALID_SAMPLE_RATE));
        }
        let input = match &stream.input {
            Some(p) => Self::check_direction(state, p, true)?,
            None => 0,
        };
        let output = match &stream.output {
            Some(p) => Self::check_direction(state, p, false)?,
            None => 0,
        };
        Ok((input, output))
    }

    fn with_stream<T>(
        &self,
        handle: StreamHandle,
        f: impl FnOnce(&mut MockStream) -> T,
    ) -> HostResult<T> {
        let mut state = self.state.lock();
        state
            .streams
            .get_mut(&handle.id().raw())
            .map(f)
            .ok_or_else(|| HostError::from_code(codes::BAD_STREAM_PTR))
    }
}

impl AudioHost for MockHost {
    fn initialize(&self) -> HostResult<()> {
        self.take_failure(MockOp::Initialize)?;
        let mut state = self.state.lock();
        state.initialized = true;
        state.calls.initializes += 1;
        Ok(())
    }

    fn terminate(&self) -> HostResult<()> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(HostError::from_code(codes::NOT_INITIALIZED));
        }
        state.initialized = false;
        state.calls.terminates += 1;
        Ok(())
    }

    fn version(&self) -> i32 {
        19_07_00
    }

    fn version_text(&self) -> String {
        "Mock audio host V19.7.0".into()
    }

    fn host_api_count(&self) -> HostResult<usize> {
        Ok(self.state.lock().host_apis.len())
    }

    fn default_host_api(&self) -> HostResult<usize> {
        let state = self.state.lock();
        if state.default_host_api < state.host_apis.len() {
            Ok(state.default_host_api)
        } else {
            Err(HostError::from_code(codes::HOST_API_NOT_FOUND))
        }
    }

    fn host_api_info(&self, host_api: usize) -> HostResult<HostApiInfo> {
        let state = self.state.lock();
        let api = state
            .host_apis
            .get(host_api)
            .ok_or_else(|| HostError::from_code(codes::INVALID_HOST_API))?;
        Ok(HostApiInfo {
            kind: api.kind,
            name: api.name.clone(),
            device_count: api.devices.len(),
            default_input_device: api.default_input,
            default_output_device: api.default_output,
        })
    }

    fn host_api_device_index_to_device_index(
        &self,
        host_api: usize,
        local_index: usize,
    ) -> HostResult<usize> {
        let state = self.state.lock();
        if let Some(global) = state.translations.get(&(host_api, local_index)) {
            return Ok(*global);
        }
        let api = state
            .host_apis
            .get(host_api)
            .ok_or_else(|| HostError::from_code(codes::INVALID_HOST_API))?;
        api.devices
            .get(local_index)
            .copied()
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))
    }

    fn device_count(&self) -> HostResult<usize> {
        Ok(self.state.lock().devices.len())
    }

    fn device_info(&self, device: usize) -> HostResult<DeviceInfo> {
        let state = self.state.lock();
        let (host_api, d) = state
            .devices
            .get(device)
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))?;
        Ok(DeviceInfo {
            name: d.name.clone(),
            host_api: *host_api,
            max_input_channels: d.max_input_channels,
            max_output_channels: d.max_output_channels,
            default_low_input_latency: d.low_latency,
            default_low_output_latency: d.low_latency,
            default_high_input_latency: d.high_latency,
            default_high_output_latency: d.high_latency,
            default_sample_rate: d.sample_rate,
        })
    }

    fn is_format_supported(&self, stream: &ResolvedStream) -> HostResult<()> {
        Self::check_stream(&self.state.lock(), stream).map(|_| ())
    }

    unsafe fn open_stream(
        &self,
        stream: &ResolvedStream,
        frames_per_buffer: u32,
        callback: StreamCallback,
        user_data: *mut c_void,
    ) -> HostResult<StreamHandle> {
        self.take_failure(MockOp::Open)?;
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(HostError::from_code(codes::NOT_INITIALIZED));
        }
        let (input_frame_size, output_frame_size) = Self::check_stream(&state, stream)?;

        let raw = FIRST_HANDLE + state.next_handle * 0x10;
        state.next_handle += 1;
        let handle = StreamHandle::from_ptr(raw as *mut c_void)
            .ok_or_else(|| HostError::from_code(codes::INTERNAL_ERROR))?;

        state.streams.insert(
            raw,
            MockStream {
                callback,
                user_data: user_data as usize,
                finished: None,
                input_frame_size,
                output_frame_size,
                frames_per_buffer,
                active: false,
                stopped: true,
                started_at: None,
            },
        );
        state.calls.opens += 1;
        Ok(handle)
    }

    fn set_stream_finished_callback(
        &self,
        stream: StreamHandle,
        callback: StreamFinishedCallback,
    ) -> HostResult<()> {
        self.take_failure(MockOp::SetFinishedCallback)?;
        self.with_stream(stream, |s| s.finished = Some(callback))
    }

    fn start_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.take_failure(MockOp::Start)?;
        let mut state = self.state.lock();
        let s = state
            .streams
            .get_mut(&stream.id().raw())
            .ok_or_else(|| HostError::from_code(codes::BAD_STREAM_PTR))?;
        if !s.stopped {
            return Err(HostError::from_code(codes::STREAM_IS_NOT_STOPPED));
        }
        s.active = true;
        s.stopped = false;
        s.started_at = Some(Instant::now());
        state.calls.starts += 1;
        Ok(())
    }

    fn stop_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.take_failure(MockOp::Stop)?;
        if self.with_stream(stream, |s| s.stopped)? {
            return Err(HostError::from_code(codes::STREAM_IS_STOPPED));
        }
        self.state.lock().calls.stops += 1;
        self.retire(stream.id().raw(), true);
        Ok(())
    }

    fn abort_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.take_failure(MockOp::Abort)?;
        if self.with_stream(stream, |s| s.stopped)? {
            return Err(HostError::from_code(codes::STREAM_IS_STOPPED));
        }
        self.state.lock().calls.aborts += 1;
        self.retire(stream.id().raw(), true);
        Ok(())
    }

    fn close_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.take_failure(MockOp::Close)?;
        let raw = stream.id().raw();
        self.with_stream(stream, |_| ())?;
        // Closing a running stream aborts it first.
        self.retire(raw, true);

        let mut state = self.state.lock();
        state.streams.remove(&raw);
        state.calls.closes += 1;
        Ok(())
    }

    fn stream_cpu_load(&self, stream: StreamHandle) -> f64 {
        let state = self.state.lock();
        match state.streams.get(&stream.id().raw()) {
            Some(s) if s.active => state.cpu_load,
            _ => 0.0,
        }
    }

    fn stream_time(&self, stream: StreamHandle) -> f64 {
        self.with_stream(stream, |s| {
            s.started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0)
        })
        .unwrap_or(0.0)
    }

    fn is_stream_active(&self, stream: StreamHandle) -> HostResult<bool> {
        self.with_stream(stream, |s| s.active)
    }

    fn is_stream_stopped(&self, stream: StreamHandle) -> HostResult<bool> {
        self.with_stream(stream, |s| s.stopped)
    }
}

/// Snapshot of managed-runtime call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCalls {
    /// Calls to `attach_current_thread_as_daemon`, including no-ops.
    pub attach_calls: usize,
    /// Distinct threads actually attached.
    pub threads_attached: usize,
    pub resolves: usize,
    pub dispatches: usize,
    pub finished: usize,
    /// Dispatch objects dropped.
    pub released: usize,
}

#[derive(Default)]
struct RuntimeState {
    attach_calls: AtomicUsize,
    resolves: AtomicUsize,
    dispatches: AtomicUsize,
    finished: AtomicUsize,
    released: AtomicUsize,
    fail_attach: AtomicBool,
    result: AtomicI32,
    complete_after: AtomicUsize,
    attached: Mutex<HashSet<ThreadId>>,
    views: Mutex<Vec<(Option<usize>, Option<usize>)>>,
}

/// Fake managed runtime.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<RuntimeState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_attach(&self, fail: bool) {
        self.state.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// Code every dispatch returns (default: continue).
    pub fn set_result(&self, code: i32) {
        self.state.result.store(code, Ordering::SeqCst);
    }

    /// Return complete from the `n`th callback of each activation.
    pub fn complete_after(&self, n: usize) {
        self.state.complete_after.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> RuntimeCalls {
        let s = &self.state;
        RuntimeCalls {
            attach_calls: s.attach_calls.load(Ordering::SeqCst),
            threads_attached: s.attached.lock().len(),
            resolves: s.resolves.load(Ordering::SeqCst),
            dispatches: s.dispatches.load(Ordering::SeqCst),
            finished: s.finished.load(Ordering::SeqCst),
            released: s.released.load(Ordering::SeqCst),
        }
    }

    /// Input and output view lengths seen by each dispatch, in order.
    pub fn views(&self) -> Vec<(Option<usize>, Option<usize>)> {
        self.state.views.lock().clone()
    }
}

impl ManagedRuntime for MockRuntime {
    type Dispatch = MockDispatch;

    fn attach_current_thread_as_daemon(&self) -> Result<(), RuntimeError> {
        self.state.attach_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_attach.load(Ordering::SeqCst) {
            return Err(RuntimeError::Attach("mock runtime refused".into()));
        }
        self.state.attached.lock().insert(thread::current().id());
        Ok(())
    }

    fn resolve_dispatch(&self, _stream: StreamId) -> Result<MockDispatch, RuntimeError> {
        self.state.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(MockDispatch {
            state: self.state.clone(),
            periods: 0,
        })
    }
}

/// Dispatch handed out by [`MockRuntime`].
pub struct MockDispatch {
    state: Arc<RuntimeState>,
    periods: usize,
}

impl Dispatch for MockDispatch {
    fn callback(
        &mut self,
        _stream: StreamId,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> i32 {
        self.periods += 1;
        self.state.dispatches.fetch_add(1, Ordering::SeqCst);
        self.state
            .views
            .lock()
            .push((input.map(<[u8]>::len), output.as_ref().map(|o| o.len())));

        if let (Some(input), Some(output)) = (input, output) {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
        }

        let complete_after = self.state.complete_after.load(Ordering::SeqCst);
        if complete_after > 0 && self.periods >= complete_after {
            return 1;
        }
        self.state.result.load(Ordering::SeqCst)
    }

    fn finished(&mut self, _stream: StreamId) {
        self.state.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockDispatch {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}
