//! CPAL-backed audio host.
//!
//! Each CPAL host becomes a host API and devices are numbered globally
//! across hosts in enumeration order, snapshotted at
//! [`initialize`](AudioHost::initialize). Streams run over CPAL raw
//! streams, so the bridge sees native byte buffers directly. CPAL has no
//! duplex streams; opening one is a native fault.

use crate::error::{codes, HostError, HostResult};
use crate::ffi::{
    StreamCallback, StreamCallbackTimeInfo, StreamFinishedCallback, StreamHandle,
    FRAMES_PER_BUFFER_UNSPECIFIED,
};
use crate::host::{AudioHost, DeviceInfo, HostApiInfo, NO_DEVICE_INDEX};
use atomic_float::AtomicF64;
use conduit_core::{HostApiKind, ResolvedStream, SampleFormat, StreamParameters};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_ulong, c_void};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const VERSION: i32 = 0x00_0F_00;
const VERSION_TEXT: &str = "CPAL 0.15";

const DEFAULT_LOW_LATENCY: f64 = 0.01;
const DEFAULT_HIGH_LATENCY: f64 = 0.1;
const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

const FIRST_HANDLE: usize = 0x10;

/// CPU load smoothing, weight of the newest period.
const LOAD_SMOOTHING: f64 = 0.1;

fn host_api_kind(id: cpal::HostId) -> HostApiKind {
    match id.name().to_ascii_lowercase().as_str() {
        "alsa" => HostApiKind::Alsa,
        "jack" => HostApiKind::Jack,
        "wasapi" => HostApiKind::Wasapi,
        "asio" => HostApiKind::Asio,
        "coreaudio" => HostApiKind::CoreAudio,
        _ => HostApiKind::Other(u8::MAX),
    }
}

fn cpal_format(format: SampleFormat) -> HostResult<cpal::SampleFormat> {
    match format {
        SampleFormat::FLOAT32 => Ok(cpal::SampleFormat::F32),
        SampleFormat::INT32 => Ok(cpal::SampleFormat::I32),
        SampleFormat::INT16 => Ok(cpal::SampleFormat::I16),
        SampleFormat::INT8 => Ok(cpal::SampleFormat::I8),
        SampleFormat::UINT8 => Ok(cpal::SampleFormat::U8),
        _ => Err(HostError::from_code(codes::SAMPLE_FORMAT_NOT_SUPPORTED)),
    }
}

fn unanticipated(e: impl std::fmt::Display) -> HostError {
    HostError::new(codes::UNANTICIPATED_HOST_ERROR, e.to_string())
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` on some platforms. It is only touched behind
/// the host's mutex and dropped there.
struct SendStream(cpal::Stream);

// SAFETY: only accessed behind `Mutex<CpalState>`, never concurrently.
unsafe impl Send for SendStream {}

/// State shared between the control thread and one stream's data callback.
struct StreamShared {
    callback: StreamCallback,
    user_data: usize,
    frame_size: usize,
    sample_rate: f64,
    finished: Mutex<Option<StreamFinishedCallback>>,
    running: AtomicBool,
    in_callback: AtomicBool,
    active: AtomicBool,
    stopped: AtomicBool,
    cpu_load: AtomicF64,
    opened_at: Instant,
}

impl StreamShared {
    fn time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    /// One period. `input` or `output` is null for the absent direction.
    fn period(&self, input: *const c_void, output: *mut c_void, bytes: usize) -> bool {
        self.in_callback.store(true, Ordering::SeqCst);
        if !self.running.load(Ordering::SeqCst) {
            self.in_callback.store(false, Ordering::SeqCst);
            return false;
        }

        let started = Instant::now();
        let frames = bytes / self.frame_size.max(1);
        let now = self.time();
        let time = StreamCallbackTimeInfo {
            input_buffer_adc_time: now,
            current_time: now,
            output_buffer_dac_time: now,
        };
        let code = unsafe {
            (self.callback)(
                input,
                output,
                frames as c_ulong,
                &time,
                0,
                self.user_data as *mut c_void,
            )
        };
        self.record_load(frames, started.elapsed());
        self.in_callback.store(false, Ordering::SeqCst);

        if code != 0 {
            self.running.store(false, Ordering::SeqCst);
            self.retire();
        }
        true
    }

    fn record_load(&self, frames: usize, elapsed: Duration) {
        if frames == 0 {
            return;
        }
        let budget = frames as f64 / self.sample_rate;
        let load = elapsed.as_secs_f64() / budget;
        let previous = self.cpu_load.load(Ordering::Relaxed);
        self.cpu_load.store(
            previous + LOAD_SMOOTHING * (load - previous),
            Ordering::Relaxed,
        );
    }

    /// Stop delivering periods and wait out one that is mid-flight.
    fn quiesce(&self) {
        self.running.store(false, Ordering::SeqCst);
        while self.in_callback.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
    }

    /// Fire the finished hook once per activation.
    fn retire(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(finished) = *self.finished.lock() {
                unsafe { finished(self.user_data as *mut c_void) };
            }
        }
    }
}

struct HostApiEntry {
    info: HostApiInfo,
    devices: Vec<usize>,
}

struct DeviceEntry {
    device: cpal::Device,
    info: DeviceInfo,
}

struct CpalStream {
    stream: SendStream,
    shared: Arc<StreamShared>,
}

#[derive(Default)]
struct CpalState {
    initialized: bool,
    host_apis: Vec<HostApiEntry>,
    devices: Vec<DeviceEntry>,
    default_host_api: usize,
    streams: HashMap<usize, CpalStream>,
    next_handle: usize,
}

// SAFETY: `cpal::Device` handles are only used behind `CpalHost`'s mutex.
unsafe impl Send for CpalState {}

/// [`AudioHost`] over the platform's CPAL hosts.
#[derive(Default)]
pub struct CpalHost {
    state: Mutex<CpalState>,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn enumerate(state: &mut CpalState) {
        let default_id = cpal::default_host().id();

        for id in cpal::available_hosts() {
            let host = match cpal::host_from_id(id) {
                Ok(host) => host,
                Err(e) => {
                    tracing::warn!(host = id.name(), error = %e, "Skipping unavailable host");
                    continue;
                }
            };
            let api_index = state.host_apis.len();
            if id == default_id {
                state.default_host_api = api_index;
            }

            let default_input = host.default_input_device().and_then(|d| d.name().ok());
            let default_output = host.default_output_device().and_then(|d| d.name().ok());

            let mut entry = HostApiEntry {
                info: HostApiInfo {
                    kind: host_api_kind(id),
                    name: id.name().to_string(),
                    device_count: 0,
                    default_input_device: NO_DEVICE_INDEX,
                    default_output_device: NO_DEVICE_INDEX,
                },
                devices: Vec::new(),
            };

            let devices = match host.devices() {
                Ok(devices) => devices,
                Err(e) => {
                    tracing::warn!(host = id.name(), error = %e, "Failed to list devices");
                    state.host_apis.push(entry);
                    continue;
                }
            };

            for device in devices {
                let info = Self::describe(&device, api_index);
                let local = entry.devices.len() as i32;
                if default_input.as_deref() == Some(info.name.as_str())
                    && info.max_input_channels > 0
                    && entry.info.default_input_device < 0
                {
                    entry.info.default_input_device = local;
                }
                if default_output.as_deref() == Some(info.name.as_str())
                    && info.max_output_channels > 0
                    && entry.info.default_output_device < 0
                {
                    entry.info.default_output_device = local;
                }
                entry.devices.push(state.devices.len());
                state.devices.push(DeviceEntry { device, info });
            }
            entry.info.device_count = entry.devices.len();
            state.host_apis.push(entry);
        }

        tracing::debug!(
            host_apis = state.host_apis.len(),
            devices = state.devices.len(),
            "Enumerated CPAL devices"
        );
    }

    fn describe(device: &cpal::Device, host_api: usize) -> DeviceInfo {
        let max_input_channels = device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels() as u32).max().unwrap_or(0))
            .unwrap_or(0);
        let max_output_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels() as u32).max().unwrap_or(0))
            .unwrap_or(0);
        let default_sample_rate = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .map(|c| c.sample_rate().0 as f64)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        DeviceInfo {
            name: device.name().unwrap_or_default(),
            host_api,
            max_input_channels,
            max_output_channels,
            default_low_input_latency: DEFAULT_LOW_LATENCY,
            default_low_output_latency: DEFAULT_LOW_LATENCY,
            default_high_input_latency: DEFAULT_HIGH_LATENCY,
            default_high_output_latency: DEFAULT_HIGH_LATENCY,
            default_sample_rate,
        }
    }

    /// The single enabled direction of a stream, and whether it is input.
    fn direction(stream: &ResolvedStream) -> HostResult<(&StreamParameters, bool)> {
        match (&stream.input, &stream.output) {
            (Some(input), None) => Ok((input, true)),
            (None, Some(output)) => Ok((output, false)),
            (Some(_), Some(_)) => Err(HostError::new(
                codes::BAD_IO_DEVICE_COMBINATION,
                "Duplex streams are not supported by this host",
            )),
            (None, None) => Err(HostError::from_code(codes::INVALID_CHANNEL_COUNT)),
        }
    }

    fn check(
        state: &CpalState,
        stream: &ResolvedStream,
    ) -> HostResult<(usize, bool, cpal::SampleFormat, cpal::StreamConfig)> {
        let (params, is_input) = Self::direction(stream)?;
        let entry = state
            .devices
            .get(params.device as usize)
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))?;

        let max = if is_input {
            entry.info.max_input_channels
        } else {
            entry.info.max_output_channels
        };
        if params.channel_count == 0 || params.channel_count > max {
            return Err(HostError::from_code(codes::INVALID_CHANNEL_COUNT));
        }
        if stream.sample_rate <= 0.0 || stream.sample_rate > u32::MAX as f64 {
            return Err(HostError::from_code(codes::INVALID_SAMPLE_RATE));
        }

        let format = cpal_format(params.sample_format)?;
        let config = cpal::StreamConfig {
            channels: params.channel_count as u16,
            sample_rate: cpal::SampleRate(stream.sample_rate as u32),
            buffer_size: cpal::BufferSize::Default,
        };
        Ok((params.device as usize, is_input, format, config))
    }

    fn with_stream<T>(
        &self,
        handle: StreamHandle,
        f: impl FnOnce(&CpalStream) -> HostResult<T>,
    ) -> HostResult<T> {
        let state = self.state.lock();
        let stream = state
            .streams
            .get(&handle.id().raw())
            .ok_or_else(|| HostError::from_code(codes::BAD_STREAM_PTR))?;
        f(stream)
    }

    fn halt(&self, handle: StreamHandle) -> HostResult<()> {
        self.with_stream(handle, |s| {
            if s.shared.stopped.load(Ordering::Acquire) {
                return Err(HostError::from_code(codes::STREAM_IS_STOPPED));
            }
            s.shared.quiesce();
            s.stream.0.pause().map_err(unanticipated)?;
            s.shared.stopped.store(true, Ordering::Release);
            s.shared.retire();
            Ok(())
        })
    }
}

impl AudioHost for CpalHost {
    fn initialize(&self) -> HostResult<()> {
        let mut state = self.state.lock();
        if !state.initialized {
            Self::enumerate(&mut state);
            state.initialized = true;
        }
        Ok(())
    }

    fn terminate(&self) -> HostResult<()> {
        let mut state = self.state.lock();
        for (_, stream) in state.streams.drain() {
            stream.shared.quiesce();
            stream.shared.retire();
        }
        *state = CpalState::default();
        Ok(())
    }

    fn version(&self) -> i32 {
        VERSION
    }

    fn version_text(&self) -> String {
        VERSION_TEXT.to_string()
    }

    fn host_api_count(&self) -> HostResult<usize> {
        Ok(self.state.lock().host_apis.len())
    }

    fn default_host_api(&self) -> HostResult<usize> {
        let state = self.state.lock();
        if state.host_apis.is_empty() {
            return Err(HostError::from_code(codes::HOST_API_NOT_FOUND));
        }
        Ok(state.default_host_api)
    }

    fn host_api_info(&self, host_api: usize) -> HostResult<HostApiInfo> {
        self.state
            .lock()
            .host_apis
            .get(host_api)
            .map(|api| api.info.clone())
            .ok_or_else(|| HostError::from_code(codes::INVALID_HOST_API))
    }

    fn host_api_device_index_to_device_index(
        &self,
        host_api: usize,
        local_index: usize,
    ) -> HostResult<usize> {
        let state = self.state.lock();
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
        self.state
            .lock()
            .devices
            .get(device)
            .map(|d| d.info.clone())
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))
    }

    fn is_format_supported(&self, stream: &ResolvedStream) -> HostResult<()> {
        let state = self.state.lock();
        let (device, is_input, format, config) = Self::check(&state, stream)?;
        let device = &state.devices[device].device;

        let supports = |range: cpal::SupportedStreamConfigRange| {
            range.channels() >= config.channels
                && range.sample_format() == format
                && range.min_sample_rate() <= config.sample_rate
                && range.max_sample_rate() >= config.sample_rate
        };
        let supported = if is_input {
            device
                .supported_input_configs()
                .map_err(unanticipated)?
                .any(supports)
        } else {
            device
                .supported_output_configs()
                .map_err(unanticipated)?
                .any(supports)
        };

        if supported {
            Ok(())
        } else {
            Err(HostError::from_code(codes::SAMPLE_FORMAT_NOT_SUPPORTED))
        }
    }

    unsafe fn open_stream(
        &self,
        stream: &ResolvedStream,
        frames_per_buffer: u32,
        callback: StreamCallback,
        user_data: *mut c_void,
    ) -> HostResult<StreamHandle> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(HostError::from_code(codes::NOT_INITIALIZED));
        }
        let (device, is_input, format, mut config) = Self::check(&state, stream)?;
        if frames_per_buffer != FRAMES_PER_BUFFER_UNSPECIFIED {
            config.buffer_size = cpal::BufferSize::Fixed(frames_per_buffer);
        }

        let width = format.sample_size();
        let shared = Arc::new(StreamShared {
            callback,
            user_data: user_data as usize,
            frame_size: width * config.channels as usize,
            sample_rate: config.sample_rate.0 as f64,
            finished: Mutex::new(None),
            running: AtomicBool::new(false),
            in_callback: AtomicBool::new(false),
            active: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            cpu_load: AtomicF64::new(0.0),
            opened_at: Instant::now(),
        });

        let device = &state.devices[device].device;
        let data_shared = shared.clone();
        // Stream errors surface on CPAL's thread; nothing to report them to.
        let on_error = |_err: cpal::StreamError| {};

        let built = if is_input {
            device.build_input_stream_raw(
                &config,
                format,
                move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                    let bytes = data.bytes();
                    data_shared.period(
                        bytes.as_ptr() as *const c_void,
                        std::ptr::null_mut(),
                        bytes.len(),
                    );
                },
                on_error,
                None,
            )
        } else {
            device.build_output_stream_raw(
                &config,
                format,
                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                    let bytes = data.bytes_mut();
                    let len = bytes.len();
                    if !data_shared.period(
                        std::ptr::null(),
                        bytes.as_mut_ptr() as *mut c_void,
                        len,
                    ) {
                        bytes.fill(0);
                    }
                },
                on_error,
                None,
            )
        };
        let cpal_stream = built.map_err(|e| HostError::new(codes::DEVICE_UNAVAILABLE, e.to_string()))?;
        // Raw streams may start playing on build.
        cpal_stream.pause().map_err(unanticipated)?;

        let raw = FIRST_HANDLE + state.next_handle * 0x10;
        state.next_handle += 1;
        let handle = StreamHandle::from_ptr(raw as *mut c_void)
            .ok_or_else(|| HostError::from_code(codes::INTERNAL_ERROR))?;
        state.streams.insert(
            raw,
            CpalStream {
                stream: SendStream(cpal_stream),
                shared,
            },
        );
        Ok(handle)
    }

    fn set_stream_finished_callback(
        &self,
        stream: StreamHandle,
        callback: StreamFinishedCallback,
    ) -> HostResult<()> {
        self.with_stream(stream, |s| {
            *s.shared.finished.lock() = Some(callback);
            Ok(())
        })
    }

    fn start_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.with_stream(stream, |s| {
            if !s.shared.stopped.load(Ordering::Acquire) {
                return Err(HostError::from_code(codes::STREAM_IS_NOT_STOPPED));
            }
            s.shared.stopped.store(false, Ordering::Release);
            s.shared.active.store(true, Ordering::Release);
            s.shared.running.store(true, Ordering::SeqCst);
            s.stream.0.play().map_err(|e| {
                s.shared.running.store(false, Ordering::SeqCst);
                s.shared.active.store(false, Ordering::Release);
                s.shared.stopped.store(true, Ordering::Release);
                unanticipated(e)
            })
        })
    }

    fn stop_stream(&self, stream: StreamHandle) -> HostResult<()> {
        self.halt(stream)
    }

    fn abort_stream(&self, stream: StreamHandle) -> HostResult<()> {
        // CPAL discards queued buffers on pause either way.
        self.halt(stream)
    }

    fn close_stream(&self, stream: StreamHandle) -> HostResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .streams
            .remove(&stream.id().raw())
            .ok_or_else(|| HostError::from_code(codes::BAD_STREAM_PTR))?;
        entry.shared.quiesce();
        entry.shared.retire();
        drop(entry.stream);
        Ok(())
    }

    fn stream_cpu_load(&self, stream: StreamHandle) -> f64 {
        self.with_stream(stream, |s| Ok(s.shared.cpu_load.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    fn stream_time(&self, stream: StreamHandle) -> f64 {
        self.with_stream(stream, |s| Ok(s.shared.time()))
            .unwrap_or(0.0)
    }

    fn is_stream_active(&self, stream: StreamHandle) -> HostResult<bool> {
        self.with_stream(stream, |s| Ok(s.shared.active.load(Ordering::Acquire)))
    }

    fn is_stream_stopped(&self, stream: StreamHandle) -> HostResult<bool> {
        self.with_stream(stream, |s| Ok(s.shared.stopped.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_api_kinds() {
        #[cfg(target_os = "linux")]
        assert_eq!(host_api_kind(cpal::HostId::Alsa), HostApiKind::Alsa);
        #[cfg(target_os = "macos")]
        assert_eq!(host_api_kind(cpal::HostId::CoreAudio), HostApiKind::CoreAudio);
        #[cfg(target_os = "windows")]
        assert_eq!(host_api_kind(cpal::HostId::Wasapi), HostApiKind::Wasapi);
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(cpal_format(SampleFormat::FLOAT32).unwrap(), cpal::SampleFormat::F32);
        assert_eq!(cpal_format(SampleFormat::INT16).unwrap(), cpal::SampleFormat::I16);
        assert_eq!(
            cpal_format(SampleFormat::INT24).unwrap_err().code,
            codes::SAMPLE_FORMAT_NOT_SUPPORTED
        );
    }

    #[test]
    fn test_duplex_is_rejected() {
        let params = StreamParameters {
            device: 0,
            channel_count: 2,
            sample_format: SampleFormat::FLOAT32,
            suggested_latency: 0.01,
        };
        let stream = ResolvedStream {
            mode: conduit_core::StreamMode::Duplex,
            input: Some(params),
            output: Some(params),
            sample_rate: 48000.0,
            flags: 0,
        };
        let err = CpalHost::direction(&stream).unwrap_err();
        assert_eq!(err.code, codes::BAD_IO_DEVICE_COMBINATION);
        assert_eq!(err.to_string(), "Duplex streams are not supported by this host");
    }

    #[test]
    fn test_load_is_smoothed() {
        extern "C" fn noop(
            _: *const c_void,
            _: *mut c_void,
            _: c_ulong,
            _: *const StreamCallbackTimeInfo,
            _: c_ulong,
            _: *mut c_void,
        ) -> std::ffi::c_int {
            0
        }

        let shared = StreamShared {
            callback: noop,
            user_data: 0,
            frame_size: 4,
            sample_rate: 1000.0,
            finished: Mutex::new(None),
            running: AtomicBool::new(false),
            in_callback: AtomicBool::new(false),
            active: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            cpu_load: AtomicF64::new(0.0),
            opened_at: Instant::now(),
        };
        // 100 frames at 1 kHz is a 100 ms budget; 50 ms is half of it.
        shared.record_load(100, Duration::from_millis(50));
        approx::assert_relative_eq!(shared.cpu_load.load(Ordering::Relaxed), 0.05);
    }
}
