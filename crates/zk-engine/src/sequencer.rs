//! Step sequencer: pattern recording, playback and transposition.
//!
//! Every step plays as two half-steps. The first half releases what the
//! step replaces and starts its notes; the second half releases early any
//! slot the next step does not tie over, which leaves the audible gap
//! before the next onset. All releases of a half-step are issued before
//! any note-on.

use zk_ir::{Cell, Pattern, PatternBank, Step, Timestamp, MAX_PATTERNS, NOTES_PER_STEP, NOTE_BASE};

use crate::clock::{ClockArbiter, ClockEvent};
use crate::voice_engine::NoteSink;

/// Velocity used for played-back notes.
pub const PLAY_VELOCITY: u8 = 127;

/// An open recording session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recording {
    /// The pattern is cleared by the first input after entering RECORD.
    pub armed: bool,
    /// Step being filled, appended on advance.
    pub open: Step,
    /// Note in slot 0 of the open step; its release advances.
    pub lead: Option<u8>,
}

impl Recording {
    fn new() -> Self {
        Self {
            armed: true,
            open: Step::EMPTY,
            lead: None,
        }
    }
}

/// Sequencer state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqState {
    /// Idle; notes go straight to the voices.
    Reset,
    /// Advancing on clock events.
    Play,
    /// Writing incoming notes into the current pattern.
    Record(Recording),
}

/// What a sequencer call can reach.
pub struct SeqContext<'a, N: NoteSink + ?Sized> {
    pub voices: &'a mut N,
    pub clock: &'a mut ClockArbiter,
    pub now: Timestamp,
}

/// The pattern sequencer.
pub struct Sequencer {
    state: SeqState,
    patterns: [Pattern; MAX_PATTERNS],
    current: usize,
    pending: Option<usize>,
    step: usize,
    second_half: bool,
    key: u8,
    sounding: [Option<u8>; NOTES_PER_STEP],
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            state: SeqState::Reset,
            patterns: core::array::from_fn(|i| Pattern::new(i as u8)),
            current: 0,
            pending: None,
            step: 0,
            second_half: false,
            key: NOTE_BASE,
            sounding: [None; NOTES_PER_STEP],
        }
    }

    pub fn state(&self) -> SeqState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SeqState::Play
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SeqState::Record(_))
    }

    /// Index of the current pattern.
    pub fn pattern_id(&self) -> u8 {
        self.current as u8
    }

    /// Pattern queued to take over at the next wrap.
    pub fn pending_pattern(&self) -> Option<u8> {
        self.pending.map(|p| p as u8)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.patterns[self.current]
    }

    pub fn patterns(&self) -> &[Pattern; MAX_PATTERNS] {
        &self.patterns
    }

    /// Replace a pattern slot. The pattern's id selects the slot.
    pub fn set_pattern_data(&mut self, pattern: Pattern) {
        let id = pattern.id as usize % MAX_PATTERNS;
        self.patterns[id] = pattern;
        self.patterns[id].id = id as u8;
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn is_second_half(&self) -> bool {
        self.second_half
    }

    /// Transposition key; playback shifts by `key - root`.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Notes currently started by playback, per slot.
    pub fn sounding(&self) -> &[Option<u8>; NOTES_PER_STEP] {
        &self.sounding
    }

    /// Incoming note-on from the keyboard or MIDI.
    pub fn note_on<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>, note: u8, velocity: u8) {
        let note = note & 0x7F;
        match self.state {
            SeqState::Reset => cx.voices.note_on(note, velocity),
            SeqState::Play => self.key = note,
            SeqState::Record(mut rec) => {
                self.begin_input(&mut rec);
                let pattern = &mut self.patterns[self.current];
                if pattern.is_empty() && rec.open.is_empty() {
                    pattern.root = note;
                }
                if rec.open.insert(note) == Some(0) {
                    rec.lead = Some(note);
                }
                self.state = SeqState::Record(rec);
                cx.voices.note_on(note, velocity);
            }
        }
    }

    /// Incoming note-off. In RECORD, releasing the lead note closes the
    /// step. In PLAY it only releases keys held from before playback;
    /// notes started by playback are left alone.
    pub fn note_off<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>, note: u8) {
        let note = note & 0x7F;
        match self.state {
            SeqState::Reset => cx.voices.note_off(note),
            SeqState::Play => {
                if !self.sounding.contains(&Some(note)) {
                    cx.voices.note_off(note);
                }
            }
            SeqState::Record(rec) => {
                cx.voices.note_off(note);
                if rec.lead == Some(note) {
                    self.advance(cx);
                }
            }
        }
    }

    /// Tap button: tap tempo, or a tie step while recording.
    pub fn tap<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        let SeqState::Record(mut rec) = self.state else {
            cx.clock.tap(cx.now);
            return;
        };
        self.begin_input(&mut rec);
        let has_notes = !rec.open.is_empty();
        self.state = SeqState::Record(rec);
        if has_notes {
            self.advance(cx);
        }
        if let SeqState::Record(mut rec) = self.state {
            rec.open = Step::TIE;
            rec.lead = None;
            self.state = SeqState::Record(rec);
            self.advance(cx);
        }
    }

    /// Next button: close the step in RECORD (a rest if nothing was
    /// played), otherwise move to the following pattern.
    pub fn next_press<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        match self.state {
            SeqState::Record(mut rec) => {
                self.begin_input(&mut rec);
                self.state = SeqState::Record(rec);
                self.advance(cx);
            }
            _ => {
                let next = (self.current + 1) % MAX_PATTERNS;
                self.set_pattern(next as u8);
            }
        }
    }

    /// Record button.
    pub fn record_press<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        match self.state {
            SeqState::Reset | SeqState::Play => {
                self.release_sounding(cx.voices);
                self.pending = None;
                self.step = 0;
                self.second_half = false;
                self.state = SeqState::Record(Recording::new());
                log::debug!("sequencer: record pattern {}", self.current);
            }
            SeqState::Record(rec) => {
                self.finish_recording(rec);
                self.step = 0;
                self.state = SeqState::Reset;
                log::debug!("sequencer: reset");
            }
        }
    }

    /// Play button.
    pub fn play_press<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        match self.state {
            SeqState::Play => {
                self.release_sounding(cx.voices);
                self.state = SeqState::Reset;
                log::debug!("sequencer: reset");
            }
            SeqState::Reset => self.start_playback(cx),
            SeqState::Record(rec) => {
                self.finish_recording(rec);
                self.start_playback(cx);
            }
        }
    }

    /// Select a pattern. While playing, the switch waits for the current
    /// pattern to wrap. Ignored while recording.
    pub fn set_pattern(&mut self, id: u8) {
        let id = id as usize % MAX_PATTERNS;
        match self.state {
            SeqState::Play => {
                self.pending = Some(id);
                log::debug!("sequencer: pattern {} queued", id);
            }
            SeqState::Reset => {
                self.current = id;
                self.pending = None;
                self.step = 0;
                self.second_half = false;
                log::debug!("sequencer: pattern {}", id);
            }
            SeqState::Record(_) => {
                log::debug!("sequencer: pattern change ignored while recording");
            }
        }
    }

    /// React to a clock event.
    pub fn clock_event<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>, event: ClockEvent) {
        match event {
            ClockEvent::HalfStep => {
                if self.state == SeqState::Play {
                    self.half_step(cx.voices);
                }
            }
            ClockEvent::Start => {
                self.release_sounding(cx.voices);
                self.enter_play();
                self.step = 0;
                self.second_half = false;
            }
            ClockEvent::Continue => {
                if self.state != SeqState::Play {
                    self.enter_play();
                }
            }
            ClockEvent::Stop => {
                self.release_sounding(cx.voices);
                cx.voices.all_notes_off();
                if self.state == SeqState::Play {
                    self.state = SeqState::Reset;
                }
            }
            ClockEvent::TimedOut => {
                if self.state == SeqState::Play {
                    self.release_sounding(cx.voices);
                    self.state = SeqState::Reset;
                    log::debug!("sequencer: clock lost, reset");
                }
            }
        }
    }

    /// Persist the current pattern.
    pub fn save<B: PatternBank>(&self, bank: &mut B) -> Result<(), B::Error> {
        let pattern = &self.patterns[self.current];
        bank.save_pattern(pattern)?;
        log::info!("pattern {} saved ({} steps)", pattern.id, pattern.len());
        Ok(())
    }

    /// Load every stored pattern. Returns how many were found.
    pub fn load<B: PatternBank>(&mut self, bank: &mut B) -> usize {
        let loaded = bank.load_patterns(&mut self.patterns);
        for (i, pattern) in self.patterns.iter_mut().enumerate() {
            pattern.id = i as u8;
        }
        loaded
    }

    fn half_step<N: NoteSink + ?Sized>(&mut self, voices: &mut N) {
        let pattern = &self.patterns[self.current];
        let step = pattern.step(self.step);
        let wraps = self.step + 1 >= pattern.len();
        let next = if wraps {
            self.patterns[self.pending.unwrap_or(self.current)].step(0)
        } else {
            pattern.step(self.step + 1)
        };
        let shift = self.key as i16 - pattern.root as i16;

        for slot in 0..NOTES_PER_STEP {
            let release = match step.cell(slot) {
                Cell::Empty => true,
                Cell::Note(_) | Cell::Tie if self.second_half => next.cell(slot) != Cell::Tie,
                Cell::Note(_) => true,
                Cell::Tie => false,
            };
            if release {
                if let Some(note) = self.sounding[slot].take() {
                    voices.note_off(note);
                }
            }
        }

        if !self.second_half {
            for slot in 0..NOTES_PER_STEP {
                if let Cell::Note(note) = step.cell(slot) {
                    let note = (note as i16 + shift).clamp(0, 127) as u8;
                    voices.note_on(note, PLAY_VELOCITY);
                    self.sounding[slot] = Some(note);
                }
            }
            self.second_half = true;
            return;
        }

        self.second_half = false;
        if wraps {
            self.step = 0;
            if let Some(next) = self.pending.take() {
                self.current = next;
                log::debug!("sequencer: pattern {}", next);
            }
        } else {
            self.step += 1;
        }
    }

    fn release_sounding<N: NoteSink + ?Sized>(&mut self, voices: &mut N) {
        for slot in self.sounding.iter_mut() {
            if let Some(note) = slot.take() {
                voices.note_off(note);
            }
        }
    }

    fn start_playback<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        cx.clock.seed(cx.now);
        self.step = 0;
        self.second_half = false;
        self.key = self.patterns[self.current].root;
        self.state = SeqState::Play;
        log::debug!("sequencer: play pattern {}", self.current);
    }

    fn enter_play(&mut self) {
        if let SeqState::Record(rec) = self.state {
            self.finish_recording(rec);
        }
        if self.state != SeqState::Play {
            self.key = self.patterns[self.current].root;
        }
        self.state = SeqState::Play;
    }

    /// First input of a session clears the pattern.
    fn begin_input(&mut self, rec: &mut Recording) {
        if rec.armed {
            rec.armed = false;
            self.patterns[self.current].clear();
        }
    }

    /// Append the open step. A full pattern starts playback.
    fn advance<N: NoteSink + ?Sized>(&mut self, cx: &mut SeqContext<'_, N>) {
        let SeqState::Record(mut rec) = self.state else {
            return;
        };
        let pattern = &mut self.patterns[self.current];
        pattern.push_step(rec.open);
        rec.open = Step::EMPTY;
        rec.lead = None;
        self.state = SeqState::Record(rec);
        if pattern.is_full() {
            log::debug!("sequencer: pattern {} full", self.current);
            self.start_playback(cx);
        }
    }

    /// Close a recording session, keeping the pattern non-empty.
    fn finish_recording(&mut self, rec: Recording) {
        let pattern = &mut self.patterns[self.current];
        if !rec.open.is_empty() {
            pattern.push_step(rec.open);
        }
        if pattern.is_empty() {
            pattern.push_step(Step::EMPTY);
        }
    }
}
