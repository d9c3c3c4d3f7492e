//! Global settings persisted alongside the patterns.

use bitflags::bitflags;

/// MIDI channel value meaning "listen on every channel".
pub const MIDI_OMNI: u8 = 16;

bitflags! {
    /// System options toggled from the panel.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SystemFlags: u8 {
        /// Fire the envelope trigger on every poly note-on, not only the first.
        const RETRIGGER = 0x01;
        /// Analog envelope loops (passed through to the envelope collaborator).
        const ENV_LOOP = 0x02;
        /// Filter cutoff follows the keyboard.
        const TRACK = 0x04;
        /// Portamento between notes.
        const GLIDE = 0x08;
    }
}

/// Clock source configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockSettings {
    /// MIDI clock ticks per sequencer half-step.
    pub midi_divisor: u8,
    /// Silence after which an external or MIDI clock is dropped (ms).
    pub timeout_ms: u16,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            midi_divisor: 3,
            timeout_ms: 3000,
        }
    }
}

/// Settings stored in the reserved settings page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    /// Receive channel (0-15) or [`MIDI_OMNI`].
    pub midi_channel: u8,
    /// Panel system options.
    pub system: SystemFlags,
    /// Fine tuning in 1/256 semitone units.
    pub tuning_trim: i8,
    /// Pitch bend range in semitones.
    pub bend_range: u8,
    /// Clock source configuration.
    pub clock: ClockSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            midi_channel: MIDI_OMNI,
            system: SystemFlags::empty(),
            tuning_trim: 0,
            bend_range: 2,
            clock: ClockSettings::default(),
        }
    }
}

impl Settings {
    /// Does a message on `channel` reach the synth?
    pub fn accepts(&self, channel: u8) -> bool {
        self.midi_channel >= MIDI_OMNI || self.midi_channel == channel
    }

    /// Clamp every field into its usable range.
    pub fn sanitized(mut self) -> Self {
        self.midi_channel = self.midi_channel.min(MIDI_OMNI);
        self.bend_range = self.bend_range.min(24);
        self.clock.midi_divisor = self.clock.midi_divisor.max(1);
        self.clock.timeout_ms = self.clock.timeout_ms.max(100);
        self
    }
}
