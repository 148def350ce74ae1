//! # Conduit - native audio bridge
//!
//! Moves audio and MIDI between a managed runtime and native audio
//! libraries.
//!
//! ## Architecture
//!
//! Conduit is an umbrella crate that coordinates:
//! - **conduit-core** - Wire formats (device, host API and stream configuration records)
//! - **conduit-stream** - Stream lifecycle and the real-time callback bridge
//! - **conduit-synth** - Lifecycle owner for a MIDI software synthesizer
//!
//! ## Quick Start
//!
//! ```ignore
//! use conduit::prelude::*;
//!
//! let bridge = AudioBridgeBuilder::new()
//!     .frames_per_buffer(256)
//!     .initialize(CpalHost::new(), DirectRuntime::new(|_| MyDispatch::default()))?;
//!
//! for api in bridge.host_apis()?.iter() {
//!     println!("{}", api?.name);
//! }
//!
//! let config = bridge.default_configuration(StreamMode::OutputOnly)?;
//! let stream = bridge.open_configuration(&config)?;
//! bridge.start(stream)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` - Real audio hardware through CPAL
//! - `soundfont` - SoundFont synthesis through RustySynth
//! - `mock` - In-process fake host, runtime and synth backend
//! - `full` - Everything that talks to hardware

/// Re-export of conduit-core for direct access
pub use conduit_core as core;

/// Stream lifecycle and callback bridge
pub use conduit_stream as stream;

/// Synthesizer context
pub use conduit_synth as synth;

// Wire formats
pub use conduit_core::{
    Device, DirectionConfig, HostApi, HostApiKind, RecordBuffer, SampleFormat,
    StreamConfiguration, StreamMode,
};

// Streams
pub use conduit_stream::{
    AudioBridge, AudioBridgeBuilder, AudioHost, CallbackResult, DirectRuntime, Dispatch,
    ManagedRuntime, StreamId, StreamInfo, StreamState,
};

#[cfg(feature = "cpal")]
pub use conduit_stream::CpalHost;

// Synth
pub use conduit_synth::{SynthBackend, SynthConfig, SynthContext, SynthEngine};

#[cfg(feature = "soundfont")]
pub use conduit_synth::RustyBackend;

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Error, Result};

    // Wire formats
    pub use crate::core::{SampleFormat, StreamConfiguration, StreamMode};

    // Streams
    pub use crate::stream::{
        AudioBridge, AudioBridgeBuilder, DirectRuntime, Dispatch, ManagedRuntime, StreamId,
    };

    #[cfg(feature = "cpal")]
    pub use crate::stream::CpalHost;

    // Synth
    pub use crate::synth::{SynthConfig, SynthContext};

    #[cfg(feature = "soundfont")]
    pub use crate::synth::RustyBackend;
}
