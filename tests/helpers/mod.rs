//! Test helpers and fixtures for conduit integration tests
//!
//! Everything runs against the in-process mock host and runtime, so no
//! audio hardware is needed in CI.

use conduit::core::{HostApiKind, SampleFormat, StreamConfiguration, StreamMode};
use conduit::stream::mock::{MockDevice, MockHost, MockHostApi, MockRuntime};
use conduit::{AudioBridge, AudioBridgeBuilder};

/// Frames per period used by the lifecycle scenarios.
pub const TEST_FRAMES: u32 = 128;

pub type TestBridge = AudioBridge<MockHost, MockRuntime>;

/// Two host APIs:
///
/// - 0: "ALSA" with devices 0 (2 in / 2 out, 48 kHz) and 1 (0 in / 8 out,
///   44.1 kHz); defaults 0 and 1.
/// - 1: "JACK" with device 2 (16 in / 16 out); no defaults.
pub fn test_host() -> MockHost {
    let host = MockHost::new();
    host.add_host_api(MockHostApi::new(HostApiKind::Alsa, "ALSA").defaults(0, 1));
    host.add_host_api(MockHostApi::new(HostApiKind::Jack, "JACK"));
    host.add_device(
        0,
        MockDevice::new("hw:0,0", 2, 2)
            .sample_rate(48000.0)
            .latency(0.005, 0.04),
    );
    host.add_device(0, MockDevice::new("hw:1,0", 0, 8).latency(0.01, 0.1));
    host.add_device(1, MockDevice::new("system", 16, 16));
    host
}

pub fn test_bridge(host: &MockHost, runtime: &MockRuntime) -> TestBridge {
    AudioBridgeBuilder::new()
        .frames_per_buffer(TEST_FRAMES)
        .initialize(host.clone(), runtime.clone())
        .expect("Failed to initialize test bridge")
}

/// Duplex on device 0, two channels each way at four bytes per sample.
pub fn duplex_config() -> StreamConfiguration {
    StreamConfiguration::new(StreamMode::Duplex)
        .input_device(0)
        .input_channels(2)
        .input_format(SampleFormat::FLOAT32)
        .output_device(0)
        .output_channels(2)
        .output_format(SampleFormat::INT32)
        .sample_rate(48000.0)
}
