//! Core data model for the zekit synthesizer.
//!
//! This crate defines the types shared by the sound engine, the sequencer
//! and the flash store: patterns and their step cells, persisted global
//! settings, decoded MIDI messages and the millisecond control clock.
//!
//! Designed to be `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

mod bank;
mod event;
mod pattern;
mod settings;
mod timestamp;

pub use bank::{NullBank, PatternBank};
pub use event::MidiMessage;
pub use pattern::{
    Cell, Pattern, Step, CELL_EMPTY, CELL_TIE, MAX_PATTERNS, MAX_STEPS, NOTES_PER_STEP, NOTE_BASE,
};
pub use settings::{ClockSettings, Settings, SystemFlags, MIDI_OMNI};
pub use timestamp::Timestamp;
