//! Host API and device enumeration tests

use crate::helpers::*;
use conduit::core::record::{DEVICE_HEADER_SIZE, HOST_API_HEADER_SIZE};
use conduit::core::{HostApiKind, StreamMode};
use conduit::stream::error::codes;
use conduit::stream::mock::{MockDevice, MockHost, MockHostApi, MockRuntime};
use approx::assert_relative_eq;

#[test]
fn test_host_api_records() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let apis = bridge.host_apis().unwrap();
    assert_eq!(apis.len(), 2);
    assert_eq!(apis.byte_len(), 2 * HOST_API_HEADER_SIZE + "ALSA".len() + "JACK".len());

    let apis = apis.decode().unwrap();
    assert_eq!(apis[0].kind, HostApiKind::Alsa);
    assert_eq!(apis[0].device_count, 2);
    assert_eq!(apis[0].default_input_device, Some(0));
    assert_eq!(apis[0].default_output_device, Some(1));

    assert_eq!(apis[1].index, 1);
    assert_eq!(apis[1].kind, HostApiKind::Jack);
    assert_eq!(apis[1].default_input_device, None);
    assert_eq!(apis[1].default_output_device, None);
}

#[test]
fn test_missing_default_is_minus_one_on_the_wire() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let jack = bridge.host_api(1).unwrap();
    assert_eq!(&jack.as_bytes()[..2], &[0xFF, 0xFF]);
}

#[test]
fn test_untranslatable_default_is_none() {
    let host = MockHost::new();
    host.add_host_api(MockHostApi::new(HostApiKind::Oss, "OSS").defaults(0, 1));
    host.add_device(0, MockDevice::new("/dev/dsp", 2, 2));
    host.add_device(0, MockDevice::new("/dev/dsp1", 2, 2));
    // Local 0 maps past the device count; local 1 fails to translate at all.
    host.set_translation_override(0, 0, 200);

    let runtime = MockRuntime::new();
    let bridge = test_bridge(&host, &runtime);
    let api = bridge.default_host_api().unwrap().first().unwrap().unwrap();
    assert_eq!(api.default_input_device, None);
    assert_eq!(api.default_output_device, Some(1));
}

#[test]
fn test_device_records() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let devices = bridge.devices().unwrap();
    assert_eq!(devices.len(), 3);
    assert_eq!(
        devices.byte_len(),
        3 * DEVICE_HEADER_SIZE + "hw:0,0".len() + "hw:1,0".len() + "system".len()
    );

    let devices = devices.decode().unwrap();
    assert_eq!(devices[0].name, "hw:0,0");
    assert_eq!(devices[0].max_input_channels, 2);
    assert_relative_eq!(devices[0].default_sample_rate, 48000.0);
    assert_relative_eq!(devices[0].default_high_output_latency, 0.04);
    assert_eq!(devices[1].max_input_channels, 0);
    assert_eq!(devices[1].max_output_channels, 8);
    assert_eq!(devices[2].host_api, 1);
}

#[test]
fn test_host_api_devices_use_global_indices() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let jack = bridge.host_api_devices(1).unwrap().decode().unwrap();
    assert_eq!(jack.len(), 1);
    assert_eq!(jack[0].index, 2);
    assert_eq!(jack[0].name, "system");

    let single = bridge.device(2).unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single.decode().unwrap(), jack);
}

#[test]
fn test_unknown_indices_are_native_faults() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    assert_eq!(
        bridge.host_api(9).unwrap_err().host_code(),
        Some(codes::INVALID_HOST_API)
    );
    assert_eq!(
        bridge.device(9).unwrap_err().host_code(),
        Some(codes::INVALID_DEVICE)
    );
}

#[test]
fn test_released_buffer_reports_its_size() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let devices = bridge.devices().unwrap();
    let size = devices.byte_len();
    assert_eq!(devices.release(), size);
}

// =============================================================================
// Default configuration
// =============================================================================

#[test]
fn test_default_duplex_configuration() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let config = bridge.default_configuration(StreamMode::Duplex).unwrap();
    assert_eq!(config.input().device, Some(0));
    assert_eq!(config.input().channels, 1);
    assert_relative_eq!(config.input().latency, 0.04);
    assert_eq!(config.output().device, Some(1));
    assert_eq!(config.output().channels, 2);
    assert_relative_eq!(config.output().latency, 0.1);
    assert_relative_eq!(config.get_sample_rate(), 44100.0);

    let id = bridge.open_configuration(&config).unwrap();
    let info = bridge.info(id).unwrap();
    assert_eq!(info.input_frame_size, 2);
    assert_eq!(info.output_frame_size, 4);
}

#[test]
fn test_default_configuration_without_default_device() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    host.set_default_host_api(1);
    let bridge = test_bridge(&host, &runtime);

    let err = bridge
        .default_configuration(StreamMode::OutputOnly)
        .unwrap_err();
    assert_eq!(err.host_code(), Some(codes::INVALID_DEVICE));
}
