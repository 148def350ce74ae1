//! Stream lifecycle tests
//!
//! Drive periods from a separate "audio" thread through the mock host and
//! check what reaches the managed runtime.

use crate::helpers::*;
use conduit::core::{SampleFormat, StreamConfiguration, StreamMode};
use conduit::stream::error::codes;
use conduit::stream::mock::{MockOp, MockRuntime};
use conduit::stream::{AttachmentState, StreamError};
use conduit::{CallbackResult, StreamState};

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_duplex_stream_end_to_end() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let id = bridge.open_configuration(&duplex_config()).unwrap();
    let info = bridge.info(id).unwrap();
    assert_eq!(info.mode, StreamMode::Duplex);
    assert_eq!(info.input_frame_size, 8);
    assert_eq!(info.output_frame_size, 8);
    assert_eq!(host.frames_per_buffer(id), Some(TEST_FRAMES));

    bridge.start(id).unwrap();
    let results = host.drive(id, 10, TEST_FRAMES as usize);
    assert_eq!(results, vec![CallbackResult::Continue.code(); 10]);

    let views = runtime.views();
    assert_eq!(views.len(), 10);
    assert!(views.iter().all(|&v| v == (Some(1024), Some(1024))));

    // The dispatch copied input into the native output buffer.
    let expected: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
    assert_eq!(host.last_output(), expected);

    bridge.stop(id).unwrap();
    let info = bridge.info(id).unwrap();
    assert_eq!(info.state, StreamState::Stopped);
    assert_eq!(info.attachments, 1);
    assert_eq!(info.finished, 1);

    bridge.close(id).unwrap();

    let calls = runtime.calls();
    assert_eq!(calls.attach_calls, 1);
    assert_eq!(calls.threads_attached, 1);
    assert_eq!(calls.resolves, 1);
    assert_eq!(calls.dispatches, 10);
    assert_eq!(calls.finished, 1);
    assert_eq!(calls.released, 1);
    assert_eq!(host.live_streams(), 0);
}

#[test]
fn test_output_only_stream_has_no_input_view() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);

    let config = StreamConfiguration::new(StreamMode::OutputOnly)
        .output_device(1)
        .output_channels(8)
        .output_format(SampleFormat::INT16)
        .sample_rate(44100.0);
    let id = bridge.open_configuration(&config).unwrap();

    bridge.start(id).unwrap();
    host.drive(id, 2, 64);
    bridge.stop(id).unwrap();

    assert_eq!(runtime.views(), vec![(None, Some(1024)); 2]);
    bridge.close(id).unwrap();
}

// =============================================================================
// Attachment
// =============================================================================

#[test]
fn test_attachment_happens_once_per_activation() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    bridge.start(id).unwrap();
    host.drive(id, 50, 32);
    assert_eq!(bridge.info(id).unwrap().attachment, AttachmentState::Attached);

    let calls = runtime.calls();
    assert_eq!(calls.dispatches, 50);
    assert_eq!(calls.attach_calls, 1);
    assert_eq!(calls.resolves, 1);
    assert_eq!(calls.released, 0);

    bridge.stop(id).unwrap();
    assert_eq!(runtime.calls().released, 1);
}

#[test]
fn test_failed_attachment_aborts_stream() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    runtime.fail_attach(true);
    bridge.start(id).unwrap();
    let results = host.drive(id, 5, 32);

    assert_eq!(results, vec![CallbackResult::Abort.code()]);
    assert_eq!(runtime.calls().dispatches, 0);
    assert_eq!(runtime.calls().resolves, 0);
    assert!(!bridge.is_active(id).unwrap());
}

#[test]
fn test_complete_ends_activation_with_one_finished() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    runtime.complete_after(3);
    bridge.start(id).unwrap();
    let results = host.drive(id, 10, 32);

    assert_eq!(results, vec![0, 0, CallbackResult::Complete.code()]);
    assert_eq!(runtime.calls().finished, 1);
    assert_eq!(bridge.info(id).unwrap().finished, 1);
}

#[test]
fn test_dispatch_code_returned_verbatim() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    runtime.set_result(7);
    bridge.start(id).unwrap();
    assert_eq!(host.drive(id, 4, 16), vec![7]);
}

#[test]
fn test_stop_without_periods_still_notifies() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    bridge.start(id).unwrap();
    bridge.stop(id).unwrap();

    let calls = runtime.calls();
    assert_eq!(calls.dispatches, 0);
    assert_eq!(calls.finished, 1);
    assert_eq!(calls.released, 1);
}

// =============================================================================
// Close and terminate
// =============================================================================

#[test]
fn test_double_close_releases_once() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    bridge.close(id).unwrap();
    assert!(matches!(
        bridge.close(id),
        Err(StreamError::UnknownStream(other)) if other == id
    ));
    assert_eq!(host.calls().closes, 1);
    assert_eq!(host.live_streams(), 0);
}

#[test]
fn test_failed_start_keeps_stream_open() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let id = bridge.open_configuration(&duplex_config()).unwrap();

    host.fail_next(MockOp::Start, codes::INTERNAL_ERROR);
    let err = bridge.start(id).unwrap_err();
    assert_eq!(err.host_code(), Some(codes::INTERNAL_ERROR));
    assert_eq!(bridge.info(id).unwrap().state, StreamState::Open);

    bridge.start(id).unwrap();
    assert!(bridge.is_active(id).unwrap());
}

#[test]
fn test_terminate_closes_everything() {
    let (host, runtime) = (test_host(), MockRuntime::new());
    let bridge = test_bridge(&host, &runtime);
    let a = bridge.open_configuration(&duplex_config()).unwrap();
    let b = bridge.open_configuration(&duplex_config()).unwrap();
    assert_ne!(a, b);
    assert_eq!(bridge.streams().len(), 2);

    bridge.start(a).unwrap();
    host.drive(a, 3, 32);
    bridge.terminate().unwrap();

    let calls = host.calls();
    assert_eq!(calls.closes, 2);
    assert_eq!(calls.terminates, 1);
    assert_eq!(host.live_streams(), 0);
    assert_eq!(runtime.calls().finished, 1);
}

#[test]
fn test_failed_initialize_reports_native_text() {
    let host = test_host();
    host.fail_next(MockOp::Initialize, codes::INTERNAL_ERROR);

    let err = conduit::AudioBridgeBuilder::new()
        .initialize(host.clone(), MockRuntime::new())
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Internal PortAudio error");
    assert_eq!(host.calls().terminates, 0);
}
