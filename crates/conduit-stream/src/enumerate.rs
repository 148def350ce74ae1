//! Host-API and device enumeration into caller-owned record buffers.

use crate::error::{codes, HostError, Result};
use crate::host::AudioHost;
use conduit_core::record::{narrow_u8, normalize_default_device};
use conduit_core::{
    Device, HostApi, RecordBuffer, RecordWriter, SampleFormat, StreamConfiguration, StreamMode,
};

/// Every host API, in native order.
pub fn host_apis<H: AudioHost>(host: &H) -> Result<RecordBuffer<HostApi>> {
    let count = host.host_api_count()?;
    let device_count = host.device_count()?;
    let mut writer = RecordWriter::with_capacity(count);
    for index in 0..count {
        writer.push(&host_api_record(host, index, device_count)?)?;
    }
    Ok(writer.finish())
}

/// One host API.
pub fn host_api<H: AudioHost>(host: &H, index: usize) -> Result<RecordBuffer<HostApi>> {
    let device_count = host.device_count()?;
    Ok(RecordBuffer::single(&host_api_record(
        host,
        index,
        device_count,
    )?)?)
}

/// The host API the native library prefers.
pub fn default_host_api<H: AudioHost>(host: &H) -> Result<RecordBuffer<HostApi>> {
    let index = host.default_host_api()?;
    host_api(host, index)
}

/// Every device, in global index order.
pub fn devices<H: AudioHost>(host: &H) -> Result<RecordBuffer<Device>> {
    let count = host.device_count()?;
    let mut writer = RecordWriter::with_capacity(count);
    for index in 0..count {
        writer.push(&device_record(host, index)?)?;
    }
    Ok(writer.finish())
}

/// One device by global index.
pub fn device<H: AudioHost>(host: &H, index: usize) -> Result<RecordBuffer<Device>> {
    Ok(RecordBuffer::single(&device_record(host, index)?)?)
}

/// Every device of one host API.
///
/// Host-local indices are translated, so each record carries its global
/// index.
pub fn host_api_devices<H: AudioHost>(host: &H, host_api: usize) -> Result<RecordBuffer<Device>> {
    let info = host.host_api_info(host_api)?;
    let mut writer = RecordWriter::with_capacity(info.device_count);
    for local in 0..info.device_count {
        let global = host.host_api_device_index_to_device_index(host_api, local)?;
        writer.push(&device_record(host, global)?)?;
    }
    Ok(writer.finish())
}

/// Stream configuration on the default host API's default devices.
///
/// Input gets one channel and output two, both INT16 at the devices'
/// default high latency. The sample rate is the lower of the devices'
/// defaults.
pub fn default_configuration<H: AudioHost>(
    host: &H,
    mode: StreamMode,
) -> Result<StreamConfiguration> {
    let api = default_host_api(host)?
        .first()
        .ok_or_else(|| HostError::from_code(codes::HOST_API_NOT_FOUND))??;

    let mut config = StreamConfiguration::new(mode);
    let mut sample_rate = f64::INFINITY;

    if mode.has_input() {
        let index = api
            .default_input_device
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))?;
        let device = device_record(host, index as usize)?;
        sample_rate = sample_rate.min(device.default_sample_rate);
        config = config
            .input_device(index)
            .input_channels(1)
            .input_format(SampleFormat::INT16)
            .input_latency(device.default_high_input_latency);
    }
    if mode.has_output() {
        let index = api
            .default_output_device
            .ok_or_else(|| HostError::from_code(codes::INVALID_DEVICE))?;
        let device = device_record(host, index as usize)?;
        sample_rate = sample_rate.min(device.default_sample_rate);
        config = config
            .output_device(index)
            .output_channels(2)
            .output_format(SampleFormat::INT16)
            .output_latency(device.default_high_output_latency);
    }

    Ok(config.sample_rate(sample_rate))
}

fn host_api_record<H: AudioHost>(host: &H, index: usize, device_count: usize) -> Result<HostApi> {
    let info = host.host_api_info(index)?;
    Ok(HostApi {
        index: narrow_u8("host api index", index as i64)?,
        kind: info.kind,
        device_count: narrow_u8("device count", info.device_count as i64)?,
        default_input_device: default_device(host, index, info.default_input_device, device_count),
        default_output_device: default_device(
            host,
            index,
            info.default_output_device,
            device_count,
        ),
        name: info.name,
    })
}

/// Global index of a host-local default, or `None` for anything unusable.
fn default_device<H: AudioHost>(
    host: &H,
    host_api: usize,
    local: i32,
    device_count: usize,
) -> Option<u8> {
    let local = usize::try_from(local).ok()?;
    let global = host
        .host_api_device_index_to_device_index(host_api, local)
        .ok()?;
    normalize_default_device(global as i64, device_count)
}

fn device_record<H: AudioHost>(host: &H, index: usize) -> Result<Device> {
    let info = host.device_info(index)?;
    Ok(Device {
        index: narrow_u8("device index", index as i64)?,
        host_api: narrow_u8("host api index", info.host_api as i64)?,
        max_input_channels: narrow_u8("max input channels", info.max_input_channels as i64)?,
        max_output_channels: narrow_u8("max output channels", info.max_output_channels as i64)?,
        default_low_input_latency: info.default_low_input_latency,
        default_low_output_latency: info.default_low_output_latency,
        default_high_input_latency: info.default_high_input_latency,
        default_high_output_latency: info.default_high_output_latency,
        default_sample_rate: info.default_sample_rate,
        name: info.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::mock::{MockDevice, MockHost, MockHostApi};
    use approx::assert_relative_eq;
    use conduit_core::record::{DEVICE_HEADER_SIZE, HOST_API_HEADER_SIZE};
    use conduit_core::HostApiKind;

    fn host() -> MockHost {
        let host = MockHost::new();
        host.add_host_api(MockHostApi::new(HostApiKind::Alsa, "ALSA").defaults(1, 0));
        host.add_host_api(MockHostApi::new(HostApiKind::Jack, "JACK").defaults(-1, 7));
        host.add_device(0, MockDevice::new("hw:0,0", 2, 2).sample_rate(48000.0));
        host.add_device(0, MockDevice::new("hw:1,0", 2, 0).sample_rate(44100.0));
        host.add_device(1, MockDevice::new("system", 8, 8));
        host
    }

    #[test]
    fn test_host_api_buffer_length() {
        let buffer = host_apis(&host()).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.byte_len(), 2 * HOST_API_HEADER_SIZE + "ALSA".len() + "JACK".len());

        let apis = buffer.decode().unwrap();
        assert_eq!(apis[0].kind, HostApiKind::Alsa);
        assert_eq!(apis[0].device_count, 2);
        assert_eq!(apis[1].index, 1);
    }

    #[test]
    fn test_default_device_sentinels() {
        let apis = host_apis(&host()).unwrap().decode().unwrap();

        // ALSA: local 1 -> global 1, local 0 -> global 0
        assert_eq!(apis[0].default_input_device, Some(1));
        assert_eq!(apis[0].default_output_device, Some(0));

        // JACK: native none, and a local index the host cannot translate
        assert_eq!(apis[1].default_input_device, None);
        assert_eq!(apis[1].default_output_device, None);
    }

    #[test]
    fn test_out_of_range_default_is_none() {
        let host = host();
        host.set_translation_override(0, 0, 99);
        let apis = host_apis(&host).unwrap().decode().unwrap();
        assert_eq!(apis[0].default_output_device, None);
    }

    #[test]
    fn test_host_api_devices_use_global_indices() {
        let devices = host_api_devices(&host(), 1).unwrap().decode().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].index, 2);
        assert_eq!(devices[0].host_api, 1);
        assert_eq!(devices[0].name, "system");
    }

    #[test]
    fn test_device_buffer_length() {
        let buffer = devices(&host()).unwrap();
        let names = "hw:0,0".len() + "hw:1,0".len() + "system".len();
        assert_eq!(buffer.byte_len(), 3 * DEVICE_HEADER_SIZE + names);
    }

    #[test]
    fn test_invalid_index_surfaces_native_error() {
        let err = device(&host(), 9).unwrap_err();
        assert!(matches!(err, StreamError::Host(ref e) if e.code == codes::INVALID_DEVICE));
        assert_eq!(err.to_string(), "Invalid device");

        assert!(host_api(&host(), 5).is_err());
    }

    #[test]
    fn test_default_configuration() {
        let config = default_configuration(&host(), StreamMode::Duplex).unwrap();
        assert_eq!(config.input().device, Some(1));
        assert_eq!(config.input().channels, 1);
        assert_eq!(config.output().device, Some(0));
        assert_eq!(config.output().channels, 2);
        assert_eq!(config.output().format, Some(SampleFormat::INT16));
        assert_relative_eq!(config.get_sample_rate(), 44100.0);
    }

    #[test]
    fn test_default_configuration_without_default_device() {
        let host = host();
        host.set_default_host_api(1);
        let err = default_configuration(&host, StreamMode::InputOnly).unwrap_err();
        assert_eq!(err.host_code(), Some(codes::INVALID_DEVICE));
    }
}
