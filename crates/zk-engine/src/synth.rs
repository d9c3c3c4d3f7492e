//! The synth core: voices, clock and sequencer behind one set of entry
//! points.

use zk_ir::{MidiMessage, NullBank, PatternBank, Settings, SystemFlags, Timestamp};

use crate::clock::{ClockArbiter, ClockSource, DEFAULT_DEBOUNCE_MS, DEFAULT_INTERVAL_MS};
use crate::frame::Frame;
use crate::pitch::{GLIDE_SHIFT, MAX_GLIDE_SHIFT};
use crate::sequencer::{SeqContext, SeqState, Sequencer};
use crate::voice_engine::{GateEdge, VoiceEngine, VoiceMode};

/// Largest render block in frames.
pub const MAX_BLOCK_FRAMES: usize = 256;

/// MIDI controller numbers understood by [`Synth::control_change`].
pub mod cc {
    pub const PORTAMENTO: u8 = 65;
    pub const CUTOFF: u8 = 74;
    pub const ALL_SOUNDS_OFF: u8 = 120;
    pub const RESET_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
    pub const MONO_MODE: u8 = 126;
    pub const POLY_MODE: u8 = 127;
}

/// Fixed engine parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output sample rate (Hz).
    pub sample_rate: u32,
    /// Frames per render block; glide advances once per block.
    pub block_frames: usize,
    /// Glide smoothing shift.
    pub glide_shift: u32,
    /// External clock debounce window (ms).
    pub debounce_ms: u32,
    /// Power-on internal half-step interval (ms).
    pub half_step_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 200_000,
            block_frames: 64,
            glide_shift: GLIDE_SHIFT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            half_step_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Config for another sample rate, other fields default.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }
}

/// The synthesizer core.
pub struct Synth<B: PatternBank = NullBank> {
    config: EngineConfig,
    settings: Settings,
    voices: VoiceEngine,
    clock: ClockArbiter,
    sequencer: Sequencer,
    bank: B,
    now: Timestamp,
}

impl Synth<NullBank> {
    /// A synth without persistent storage.
    pub fn without_storage(config: EngineConfig) -> Self {
        Self::new(config, NullBank)
    }
}

impl<B: PatternBank> Synth<B> {
    /// Build the synth and load settings and patterns from `bank`.
    pub fn new(config: EngineConfig, mut bank: B) -> Self {
        let mut config = config;
        config.block_frames = config.block_frames.clamp(1, MAX_BLOCK_FRAMES);
        config.glide_shift = config.glide_shift.clamp(1, MAX_GLIDE_SHIFT);
        let settings = bank.load_settings().unwrap_or_default().sanitized();
        let mut sequencer = Sequencer::new();
        let loaded = sequencer.load(&mut bank);
        log::info!("loaded {} stored patterns", loaded);

        let mut synth = Self {
            config,
            settings,
            voices: VoiceEngine::new(config.sample_rate, config.glide_shift),
            clock: ClockArbiter::new(config.half_step_ms, config.debounce_ms, settings.clock),
            sequencer,
            bank,
            now: Timestamp::default(),
        };
        synth.apply_settings();
        synth
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn voices(&self) -> &VoiceEngine {
        &self.voices
    }

    pub fn clock(&self) -> &ClockArbiter {
        &self.clock
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    /// Give back the storage.
    pub fn into_bank(self) -> B {
        self.bank
    }

    /// Control time of the last update.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Replace the settings and apply them immediately.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings.sanitized();
        self.apply_settings();
    }

    /// Persist settings if they differ from the stored copy.
    pub fn save_settings(&mut self) -> Result<bool, B::Error> {
        let written = self.bank.save_settings(&self.settings)?;
        if written {
            log::info!("settings saved");
        } else {
            log::info!("settings unchanged");
        }
        Ok(written)
    }

    fn apply_settings(&mut self) {
        self.voices.set_flags(self.settings.system);
        self.voices.set_tuning_trim(self.settings.tuning_trim);
        self.voices.set_bend_range(self.settings.bend_range);
        self.clock.configure(self.settings.clock);
    }

    fn set_system_flag(&mut self, flag: SystemFlags, on: bool) {
        self.settings.system.set(flag, on);
        self.voices.set_flags(self.settings.system);
    }

    // --- Notes and controllers ---

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let (seq, mut cx) = self.split();
        seq.note_on(&mut cx, note, velocity);
    }

    pub fn note_off(&mut self, note: u8) {
        let (seq, mut cx) = self.split();
        seq.note_off(&mut cx, note);
    }

    pub fn all_notes_off(&mut self) {
        self.voices.all_notes_off();
    }

    pub fn all_sounds_off(&mut self) {
        self.voices.all_sounds_off();
    }

    /// Select a waveform: 0-7 mono patches, 8-15 poly patches.
    pub fn set_waveform(&mut self, id: u8) {
        self.voices.set_waveform(id);
    }

    /// Panel mono/poly button.
    pub fn toggle_mode(&mut self) {
        self.voices.toggle_mode();
    }

    /// Centered 14-bit bend value.
    pub fn set_pitch_bend(&mut self, value: i16) {
        self.voices.set_bend(value);
    }

    pub fn set_cutoff(&mut self, value: u8) {
        self.voices.set_cutoff(value);
    }

    pub fn reset_controllers(&mut self) {
        self.voices.reset_controllers();
    }

    /// 10-bit cutoff CV for the filter.
    pub fn cutoff_output(&self) -> u16 {
        self.voices.cutoff_output()
    }

    /// Next edge for the envelope generator.
    pub fn take_gate_edge(&mut self) -> Option<GateEdge> {
        self.voices.take_edge()
    }

    pub fn gate_is_open(&self) -> bool {
        self.voices.gate_is_open()
    }

    pub fn control_change(&mut self, controller: u8, value: u8) {
        match controller {
            cc::ALL_SOUNDS_OFF => self.all_sounds_off(),
            cc::RESET_CONTROLLERS => self.reset_controllers(),
            cc::ALL_NOTES_OFF => self.all_notes_off(),
            cc::MONO_MODE => self.voices.set_mode(VoiceMode::Mono),
            cc::POLY_MODE => self.voices.set_mode(VoiceMode::Poly),
            cc::CUTOFF => self.set_cutoff(value),
            cc::PORTAMENTO => self.set_system_flag(SystemFlags::GLIDE, value >= 64),
            _ => {}
        }
    }

    pub fn program_change(&mut self, program: u8) {
        self.set_waveform(program);
    }

    /// Dispatch a decoded MIDI message.
    pub fn handle_midi(&mut self, message: MidiMessage) {
        if let Some(channel) = message.channel() {
            if !self.settings.accepts(channel) {
                return;
            }
        }
        match message {
            MidiMessage::NoteOn { note, velocity: 0, .. } => self.note_off(note),
            MidiMessage::NoteOn { note, velocity, .. } => self.note_on(note, velocity),
            MidiMessage::NoteOff { note, .. } => self.note_off(note),
            MidiMessage::ControlChange { controller, value, .. } => {
                self.control_change(controller, value)
            }
            MidiMessage::ProgramChange { program, .. } => self.program_change(program),
            MidiMessage::PitchBend { value, .. } => self.set_pitch_bend(value),
            MidiMessage::Clock => self.clock_tick(),
            MidiMessage::Start => self.clock_start(),
            MidiMessage::Continue => self.clock_continue(),
            MidiMessage::Stop => self.clock_stop(),
        }
    }

    // --- Clock ---

    pub fn clock_tick(&mut self) {
        self.clock.midi_tick(self.now);
        self.pump();
    }

    pub fn clock_start(&mut self) {
        self.clock.midi_start(self.now);
        self.pump();
    }

    pub fn clock_continue(&mut self) {
        self.clock.midi_continue(self.now);
        self.pump();
    }

    pub fn clock_stop(&mut self) {
        self.clock.midi_stop();
        self.pump();
    }

    pub fn external_clock_edge(&mut self) {
        self.clock.external_edge(self.now);
        self.pump();
    }

    pub fn external_clock_start(&mut self) {
        self.clock.external_start(self.now);
        self.pump();
    }

    pub fn clock_source(&self) -> ClockSource {
        self.clock.source()
    }

    /// Advance control time and run every clock event now due.
    pub fn update(&mut self, now: Timestamp) {
        self.now = now;
        self.pump();
    }

    fn pump(&mut self) {
        loop {
            let running = self.sequencer.is_playing();
            let Some(event) = self.clock.poll(self.now, running) else {
                break;
            };
            let (seq, mut cx) = self.split();
            seq.clock_event(&mut cx, event);
        }
    }

    // --- Sequencer ---

    pub fn sequencer_tap(&mut self) {
        let (seq, mut cx) = self.split();
        seq.tap(&mut cx);
    }

    /// Persist the current pattern.
    pub fn sequencer_save(&mut self) -> Result<(), B::Error> {
        self.sequencer.save(&mut self.bank)
    }

    pub fn sequencer_record_press(&mut self) {
        let (seq, mut cx) = self.split();
        seq.record_press(&mut cx);
    }

    pub fn sequencer_play_press(&mut self) {
        let (seq, mut cx) = self.split();
        seq.play_press(&mut cx);
        self.pump();
    }

    pub fn sequencer_next_press(&mut self) {
        let (seq, mut cx) = self.split();
        seq.next_press(&mut cx);
    }

    pub fn sequencer_state(&self) -> SeqState {
        self.sequencer.state()
    }

    pub fn set_pattern(&mut self, id: u8) {
        self.sequencer.set_pattern(id);
    }

    pub fn get_pattern(&self) -> u8 {
        self.sequencer.pattern_id()
    }

    fn split(&mut self) -> (&mut Sequencer, SeqContext<'_, VoiceEngine>) {
        (
            &mut self.sequencer,
            SeqContext {
                voices: &mut self.voices,
                clock: &mut self.clock,
                now: self.now,
            },
        )
    }

    // --- Audio ---

    /// Render interleaved samples (left silent, right signal) in blocks of
    /// the configured size.
    pub fn render(&mut self, out: &mut [i16]) {
        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| self.render_blocks(out));
        }
        #[cfg(not(feature = "alloc_check"))]
        self.render_blocks(out);
    }

    /// Render into frames.
    pub fn render_frames(&mut self, frames: &mut [Frame]) {
        let mut scratch = [0i16; MAX_BLOCK_FRAMES * 2];
        for chunk in frames.chunks_mut(self.config.block_frames) {
            let samples = &mut scratch[..chunk.len() * 2];
            self.render(samples);
            Frame::copy_from_interleaved(chunk, samples);
        }
    }

    fn render_blocks(&mut self, out: &mut [i16]) {
        for block in out.chunks_mut(self.config.block_frames * 2) {
            self.voices.render(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_ir::{Pattern, Step};

    fn synth() -> Synth {
        Synth::without_storage(EngineConfig::default())
    }

    #[test]
    fn oversized_glide_shift_is_clamped() {
        let mut s = Synth::without_storage(EngineConfig {
            glide_shift: 40,
            ..EngineConfig::default()
        });
        assert_eq!(s.config().glide_shift, MAX_GLIDE_SHIFT);
        s.set_settings(Settings {
            system: SystemFlags::GLIDE,
            ..Settings::default()
        });
        s.note_on(36, 100);
        s.note_on(96, 100);
        let mut buf = [0i16; 256];
        s.render(&mut buf);
        assert!(s.voices().voices()[0].increment > 0);
    }

    #[test]
    fn velocity_zero_is_note_off() {
        let mut s = synth();
        s.handle_midi(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 });
        assert_eq!(s.voices().active_count(), 1);
        s.handle_midi(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 0 });
        assert_eq!(s.voices().active_count(), 0);
    }

    #[test]
    fn channel_filter_drops_other_channels() {
        let mut s = synth();
        s.set_settings(Settings {
            midi_channel: 2,
            ..Settings::default()
        });
        s.handle_midi(MidiMessage::NoteOn { channel: 3, note: 60, velocity: 100 });
        assert_eq!(s.voices().active_count(), 0);
        s.handle_midi(MidiMessage::NoteOn { channel: 2, note: 60, velocity: 100 });
        assert_eq!(s.voices().active_count(), 1);
    }

    #[test]
    fn mode_controllers_switch_families() {
        let mut s = synth();
        s.set_waveform(3);
        s.note_on(60, 100);
        s.control_change(cc::POLY_MODE, 0);
        assert_eq!(s.voices().mode(), VoiceMode::Poly);
        assert_eq!(s.voices().waveform().id(), 11);
        assert_eq!(s.voices().active_count(), 0);
        s.control_change(cc::MONO_MODE, 0);
        assert_eq!(s.voices().waveform().id(), 3);
    }

    #[test]
    fn toggle_mode_silences_then_keeps_patch() {
        let mut s = synth();
        s.program_change(9);
        s.note_on(60, 100);
        s.note_on(64, 100);
        s.toggle_mode();
        assert_eq!(s.voices().mode(), VoiceMode::Mono);
        assert_eq!(s.voices().waveform().id(), 1);
        assert!(s.voices().voices().iter().all(|v| !v.sounding));
    }

    #[test]
    fn portamento_controller_toggles_glide() {
        let mut s = synth();
        s.control_change(cc::PORTAMENTO, 127);
        assert!(s.settings().system.contains(SystemFlags::GLIDE));
        s.control_change(cc::PORTAMENTO, 0);
        assert!(!s.settings().system.contains(SystemFlags::GLIDE));
    }

    #[test]
    fn cutoff_controller_sets_base() {
        let mut s = synth();
        s.handle_midi(MidiMessage::ControlChange { channel: 0, controller: cc::CUTOFF, value: 10 });
        assert_eq!(s.cutoff_output(), 80);
        s.control_change(cc::RESET_CONTROLLERS, 0);
        assert_eq!(s.cutoff_output(), 127 * 8);
    }

    #[test]
    fn play_press_fires_first_step_immediately() {
        let mut s = synth();
        s.update(Timestamp::from_millis(5000));
        s.sequencer_play_press();
        assert_eq!(s.voices().voices()[0].note, Some(48));
        assert_eq!(s.take_gate_edge(), Some(GateEdge::Trigger));
    }

    #[test]
    fn internal_clock_steps_pattern() {
        let mut s = synth();
        let p = Pattern::from_steps(0, 48, 0, &[Step::note(48), Step::note(55)]).unwrap();
        s.sequencer_mut().set_pattern_data(p);
        s.sequencer_play_press();
        assert_eq!(s.voices().voices()[0].note, Some(48));
        s.update(Timestamp::from_millis(250));
        assert_eq!(s.voices().active_count(), 0);
        s.update(Timestamp::from_millis(500));
        assert_eq!(s.voices().voices()[0].note, Some(55));
    }

    #[test]
    fn midi_realtime_drives_sequencer() {
        let mut s = synth();
        s.handle_midi(MidiMessage::Start);
        assert!(s.sequencer().is_playing());
        assert_eq!(s.clock_source(), ClockSource::Midi);
        s.handle_midi(MidiMessage::Clock);
        assert_eq!(s.voices().voices()[0].note, Some(48));
        s.handle_midi(MidiMessage::Stop);
        assert!(!s.sequencer().is_playing());
        assert_eq!(s.voices().active_count(), 0);
    }

    #[test]
    fn render_splits_into_blocks() {
        let mut s = synth();
        s.set_settings(Settings {
            system: SystemFlags::GLIDE,
            ..Settings::default()
        });
        s.note_on(48, 100);
        s.note_on(72, 100);
        let mut buf = [0i16; 64 * 2 * 4];
        s.render(&mut buf);
        // four blocks, four glide updates
        let mut reference = VoiceEngine::new(200_000, GLIDE_SHIFT);
        reference.set_flags(SystemFlags::GLIDE);
        reference.note_on(48, 100);
        reference.note_on(72, 100);
        let mut block = [0i16; 128];
        for _ in 0..4 {
            reference.render(&mut block);
        }
        assert_eq!(s.voices().voices()[0].increment, reference.voices()[0].increment);
    }

    #[test]
    fn frames_match_interleaved_render() {
        let mut a = synth();
        let mut b = synth();
        a.note_on(60, 100);
        b.note_on(60, 100);
        let mut samples = [0i16; 200];
        let mut frames = [Frame::silence(); 100];
        a.render(&mut samples);
        b.render_frames(&mut frames);
        for (frame, pair) in frames.iter().zip(samples.chunks(2)) {
            assert_eq!(frame.right, pair[1]);
        }
    }
}
