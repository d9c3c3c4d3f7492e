//! Sound engine for the zekit synthesizer.
//!
//! Fixed-point oscillators driven by a small voice allocator, a clock
//! arbiter reconciling internal, external and MIDI tempo sources, and the
//! pattern sequencer that plays through them. [`Synth`] ties them
//! together behind the entry points the device and host call.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod clock;
mod frame;
mod oscillator;
pub mod pitch;
pub mod sequencer;
mod synth;
pub mod voice_engine;
pub mod waves;

pub use clock::{ClockArbiter, ClockEvent, ClockSource};
pub use frame::Frame;
pub use oscillator::Oscillator;
pub use pitch::{Glide, PitchTable, MAX_GLIDE_SHIFT};
pub use sequencer::{SeqContext, SeqState, Sequencer};
pub use synth::{cc, EngineConfig, Synth, MAX_BLOCK_FRAMES};
pub use voice_engine::{GateEdge, NoteSink, VoiceEngine, VoiceMode, MAX_VOICES};
pub use waves::{OscPreset, Waveform};
