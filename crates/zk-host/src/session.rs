//! A synth bound to a flash store, driven in fixed-size blocks.
//!
//! Control time is derived from the number of frames rendered, so live and
//! offline rendering see the same clock.

use zk_engine::{Frame, SeqState, Synth};
use zk_ir::{MidiMessage, Settings, Timestamp};
use zk_store::{FlashStorage, PatternStore, StoreError};

use crate::config::HostConfig;

/// Control input delivered to the synth between render blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    /// Decoded MIDI, filtered by the configured channel.
    Midi(MidiMessage),
    Waveform(u8),
    ToggleMode,
    Tap,
    RecordPress,
    PlayPress,
    NextPress,
    SetPattern(u8),
    /// Persist the current pattern.
    SavePattern,
    /// Apply and persist new settings.
    SaveSettings(Settings),
    ExternalClockStart,
    ExternalClockEdge,
}

/// A control event due at a point in control time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cue {
    pub at_ms: u32,
    pub event: ControlEvent,
}

impl Cue {
    pub const fn new(at_ms: u32, event: ControlEvent) -> Self {
        Self { at_ms, event }
    }
}

pub struct Session<F: FlashStorage> {
    synth: Synth<PatternStore<F>>,
    block: Vec<Frame>,
    frames: u64,
}

impl<F: FlashStorage> Session<F> {
    /// Build a synth over `flash`. Settings stored in flash win over the
    /// configured power-on settings.
    pub fn new(config: &HostConfig, sample_rate: u32, flash: F) -> Self {
        let mut synth = Synth::new(config.engine_config(sample_rate), PatternStore::new(flash));
        if synth.bank().read_settings().is_none() {
            synth.set_settings(config.settings());
        }
        let block = vec![Frame::silence(); synth.config().block_frames];
        Self {
            synth,
            block,
            frames: 0,
        }
    }

    pub fn synth(&self) -> &Synth<PatternStore<F>> {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut Synth<PatternStore<F>> {
        &mut self.synth
    }

    pub fn into_flash(self) -> F {
        self.synth.into_bank().into_flash()
    }

    pub fn sample_rate(&self) -> u32 {
        self.synth.config().sample_rate
    }

    /// Control time at the start of the next block.
    pub fn now(&self) -> Timestamp {
        let ms = self.frames * 1000 / self.sample_rate() as u64;
        Timestamp::from_millis(ms as u32)
    }

    pub fn sequencer_state(&self) -> SeqState {
        self.synth.sequencer_state()
    }

    /// True once the store refused writes after an erase failure.
    pub fn is_poisoned(&self) -> bool {
        self.synth.bank().is_poisoned()
    }

    pub fn apply(&mut self, event: ControlEvent) -> Result<(), StoreError> {
        let now = self.now();
        let synth = &mut self.synth;
        synth.update(now);
        match event {
            ControlEvent::NoteOn { note, velocity } => synth.note_on(note, velocity),
            ControlEvent::NoteOff { note } => synth.note_off(note),
            ControlEvent::Midi(message) => synth.handle_midi(message),
            ControlEvent::Waveform(id) => synth.set_waveform(id),
            ControlEvent::ToggleMode => synth.toggle_mode(),
            ControlEvent::Tap => synth.sequencer_tap(),
            ControlEvent::RecordPress => synth.sequencer_record_press(),
            ControlEvent::PlayPress => synth.sequencer_play_press(),
            ControlEvent::NextPress => synth.sequencer_next_press(),
            ControlEvent::SetPattern(id) => synth.set_pattern(id),
            ControlEvent::SavePattern => synth.sequencer_save()?,
            ControlEvent::SaveSettings(settings) => {
                synth.set_settings(settings);
                synth.save_settings()?;
            }
            ControlEvent::ExternalClockStart => synth.external_clock_start(),
            ControlEvent::ExternalClockEdge => synth.external_clock_edge(),
        }
        Ok(())
    }

    /// Run due clock events and render one block.
    pub fn render_block(&mut self) -> &[Frame] {
        let now = self.now();
        self.synth.update(now);
        self.synth.render_frames(&mut self.block);
        self.frames += self.block.len() as u64;
        &self.block
    }

    /// Render `frame_count` frames, applying each cue at the first block
    /// boundary at or after its time. Cues must be sorted by time.
    pub fn render_cued(&mut self, cues: &[Cue], frame_count: usize) -> Result<Vec<Frame>, StoreError> {
        let mut out = Vec::with_capacity(frame_count);
        let mut pending = cues.iter().peekable();
        while out.len() < frame_count {
            let now = self.now().millis();
            while let Some(cue) = pending.next_if(|cue| cue.at_ms <= now) {
                self.apply(cue.event)?;
            }
            let block = self.render_block();
            let take = block.len().min(frame_count - out.len());
            out.extend_from_slice(&block[..take]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_store::MemoryFlash;

    fn session() -> Session<MemoryFlash> {
        Session::new(&HostConfig::load(None), 48_000, MemoryFlash::new())
    }

    #[test]
    fn control_time_follows_frames() {
        let mut s = session();
        assert_eq!(s.now().millis(), 0);
        for _ in 0..750 {
            s.render_block();
        }
        // 750 blocks of 64 frames at 48 kHz
        assert_eq!(s.now().millis(), 1000);
    }

    #[test]
    fn cued_note_sounds() {
        let mut s = session();
        let cues = [
            Cue::new(10, ControlEvent::NoteOn { note: 69, velocity: 100 }),
            Cue::new(50, ControlEvent::NoteOff { note: 69 }),
        ];
        let frames = s.render_cued(&cues, 4800).unwrap();
        assert_eq!(frames.len(), 4800);
        // the note starts on the first block at or after 10 ms (frame 512)
        assert!(frames[..512].iter().all(|f| f.signal() == 0));
        assert!(frames[512..2368].iter().any(|f| f.signal() != 0));
        assert!(frames.iter().all(|f| f.left == 0));
    }

    #[test]
    fn stored_settings_win_over_config() {
        let mut s = session();
        let settings = Settings {
            midi_channel: 5,
            ..Settings::default()
        };
        s.apply(ControlEvent::SaveSettings(settings)).unwrap();
        let flash = s.into_flash();
        let s = Session::new(&HostConfig::load(None), 48_000, flash);
        assert_eq!(s.synth().settings().midi_channel, 5);
    }
}
