//! MIDI short messages routed to a synth engine.

use crate::backend::SynthEngine;
use crate::error::Result;
use midly::live::LiveEvent;
use midly::MidiMessage;

/// Status nibbles of the channel messages the router understands.
pub mod command {
    pub const NOTE_OFF: i32 = 0x80;
    pub const NOTE_ON: i32 = 0x90;
    pub const CONTROL_CHANGE: i32 = 0xB0;
    pub const PROGRAM_CHANGE: i32 = 0xC0;
    pub const PITCH_BEND: i32 = 0xE0;
}

/// A channel message the synth acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortMessage {
    NoteOn { channel: i32, key: i32, velocity: i32 },
    NoteOff { channel: i32, key: i32 },
    ControlChange { channel: i32, controller: i32, value: i32 },
    ProgramChange { channel: i32, program: i32 },
    /// 14-bit bend value, 8192 centered.
    PitchBend { channel: i32, value: i32 },
}

impl ShortMessage {
    /// Decode a command with its two data bytes.
    ///
    /// Commands the synth has no use for (aftertouch, system messages)
    /// give `None`.
    pub fn from_parts(channel: i32, command: i32, data1: i32, data2: i32) -> Option<Self> {
        match command {
            command::NOTE_ON => Some(Self::NoteOn {
                channel,
                key: data1,
                velocity: data2,
            }),
            command::NOTE_OFF => Some(Self::NoteOff { channel, key: data1 }),
            command::PROGRAM_CHANGE => Some(Self::ProgramChange {
                channel,
                program: data1,
            }),
            command::CONTROL_CHANGE => Some(Self::ControlChange {
                channel,
                controller: data1,
                value: data2,
            }),
            command::PITCH_BEND => Some(Self::PitchBend {
                channel,
                value: data2 * 128 + data1,
            }),
            _ => None,
        }
    }

    /// Parse raw MIDI bytes.
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>> {
        Ok(Self::from_live_event(LiveEvent::parse(bytes)?))
    }

    pub fn from_live_event(event: LiveEvent<'_>) -> Option<Self> {
        let LiveEvent::Midi { channel, message } = event else {
            return None;
        };
        let channel = channel.as_int() as i32;
        match message {
            MidiMessage::NoteOn { key, vel } => Some(Self::NoteOn {
                channel,
                key: key.as_int() as i32,
                velocity: vel.as_int() as i32,
            }),
            MidiMessage::NoteOff { key, .. } => Some(Self::NoteOff {
                channel,
                key: key.as_int() as i32,
            }),
            MidiMessage::Controller { controller, value } => Some(Self::ControlChange {
                channel,
                controller: controller.as_int() as i32,
                value: value.as_int() as i32,
            }),
            MidiMessage::ProgramChange { program } => Some(Self::ProgramChange {
                channel,
                program: program.as_int() as i32,
            }),
            MidiMessage::PitchBend { bend } => Some(Self::PitchBend {
                channel,
                value: bend.0.as_int() as i32,
            }),
            _ => None,
        }
    }

    /// Forward to the matching engine call.
    pub fn dispatch<E: SynthEngine + ?Sized>(self, engine: &mut E) {
        match self {
            Self::NoteOn {
                channel,
                key,
                velocity,
            } => engine.noteon(channel, key, velocity),
            Self::NoteOff { channel, key } => engine.noteoff(channel, key),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => engine.cc(channel, controller, value),
            Self::ProgramChange { channel, program } => engine.program_change(channel, program),
            Self::PitchBend { channel, value } => engine.pitch_bend(channel, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_bend_combines_data_bytes() {
        assert_eq!(
            ShortMessage::from_parts(2, command::PITCH_BEND, 0x00, 0x40),
            Some(ShortMessage::PitchBend {
                channel: 2,
                value: 8192
            })
        );
        assert_eq!(
            ShortMessage::from_parts(0, command::PITCH_BEND, 0x7F, 0x7F),
            Some(ShortMessage::PitchBend {
                channel: 0,
                value: 16383
            })
        );
    }

    #[test]
    fn test_unhandled_commands_ignored() {
        assert_eq!(ShortMessage::from_parts(0, 0xA0, 60, 10), None);
        assert_eq!(ShortMessage::from_parts(0, 0xD0, 10, 0), None);
    }

    #[test]
    fn test_parse_live_bytes() {
        assert_eq!(
            ShortMessage::parse(&[0x93, 60, 100]).unwrap(),
            Some(ShortMessage::NoteOn {
                channel: 3,
                key: 60,
                velocity: 100
            })
        );
        assert_eq!(
            ShortMessage::parse(&[0xE0, 0x00, 0x40]).unwrap(),
            Some(ShortMessage::PitchBend {
                channel: 0,
                value: 8192
            })
        );
        assert_eq!(
            ShortMessage::parse(&[0xB1, 7, 90]).unwrap(),
            Some(ShortMessage::ControlChange {
                channel: 1,
                controller: 7,
                value: 90
            })
        );
        // Timing clock is a system message.
        assert_eq!(ShortMessage::parse(&[0xF8]).unwrap(), None);
        assert!(ShortMessage::parse(&[]).is_err());
    }
}
