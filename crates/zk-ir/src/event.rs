//! Decoded MIDI messages delivered to the synth core.
//!
//! Byte-stream framing happens outside the core; these are the messages
//! the framer hands over.

/// A decoded channel or realtime MIDI message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on. A velocity of 0 is treated as a note off.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note off.
    NoteOff { channel: u8, note: u8 },
    /// Control change.
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Program change (selects a waveform patch).
    ProgramChange { channel: u8, program: u8 },
    /// Pitch bend, centered on 0 (-8192..=8191).
    PitchBend { channel: u8, value: i16 },
    /// Realtime clock tick (24 per quarter note).
    Clock,
    /// Realtime start.
    Start,
    /// Realtime continue.
    Continue,
    /// Realtime stop.
    Stop,
}

impl MidiMessage {
    /// Channel of a channel message, `None` for realtime messages.
    pub const fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Build a pitch bend from the two 7-bit data bytes of the wire message.
    pub const fn pitch_bend(channel: u8, lsb: u8, msb: u8) -> Self {
        let raw = ((msb as i16 & 0x7F) << 7) | (lsb as i16 & 0x7F);
        MidiMessage::PitchBend {
            channel,
            value: raw - 8192,
        }
    }
}
