//! Integration test modules for conduit
//!
//! Test categories:
//! - streams: open/start/drive/stop/close against the mock host
//! - enumeration: host API and device record buffers
//! - synth: synth context lifecycle and MIDI routing

pub mod enumeration;
pub mod streams;
pub mod synth;
