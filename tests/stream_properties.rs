//! Property tests for stream configuration handling
//!
//! Run with:
//! ```bash
//! cargo test -p conduit --test stream_properties
//! ```

mod helpers;

use conduit::core::{RecordError, SampleFormat, StreamConfiguration, StreamMode};
use conduit::stream::mock::MockRuntime;
use conduit::stream::StreamError;
use helpers::*;
use proptest::prelude::*;

fn arb_format() -> impl Strategy<Value = SampleFormat> {
    prop::sample::select(vec![
        SampleFormat::FLOAT32,
        SampleFormat::INT32,
        SampleFormat::INT24,
        SampleFormat::INT16,
        SampleFormat::INT8,
        SampleFormat::UINT8,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Frame size is channels times sample width for every enabled direction.
    #[test]
    fn prop_frame_sizes(
        in_channels in 1u8..=2,
        out_channels in 1u8..=2,
        in_format in arb_format(),
        out_format in arb_format(),
    ) {
        let (host, runtime) = (test_host(), MockRuntime::new());
        let bridge = test_bridge(&host, &runtime);

        let config = StreamConfiguration::new(StreamMode::Duplex)
            .input_device(0)
            .input_channels(in_channels)
            .input_format(in_format)
            .output_device(0)
            .output_channels(out_channels)
            .output_format(out_format)
            .sample_rate(48000.0);
        let id = bridge.open_configuration(&config).unwrap();
        let info = bridge.info(id).unwrap();

        prop_assert_eq!(
            info.input_frame_size,
            in_channels as usize * in_format.bytes_per_sample().unwrap()
        );
        prop_assert_eq!(
            info.output_frame_size,
            out_channels as usize * out_format.bytes_per_sample().unwrap()
        );
    }

    /// Any mode tag outside 1..=3 is rejected before the native library is called.
    #[test]
    fn prop_unhandled_mode_never_opens(tag in any::<u8>().prop_filter("valid mode", |t| !(1..=3).contains(t))) {
        let (host, runtime) = (test_host(), MockRuntime::new());
        let bridge = test_bridge(&host, &runtime);

        let mut record = duplex_config().to_record().unwrap();
        record.mode = tag;
        let err = bridge.open(&record.encode().unwrap()).unwrap_err();

        prop_assert!(matches!(err, StreamError::Record(RecordError::UnhandledMode(t)) if t == tag));
        prop_assert_eq!(host.calls().opens, 0);
    }
}
