//! VoiceEngine: voice allocation, gate edges and the oscillator render loop.

use heapless::Deque;
use zk_ir::SystemFlags;

use crate::oscillator::Oscillator;
use crate::pitch::{self, Glide, PitchTable};
use crate::waves::{OscPreset, Waveform, MONO_OSCS, MONO_PATCHES, POLY_OSCS, POLY_PATCHES};

/// Number of voice slots.
pub const MAX_VOICES: usize = 4;

/// Oscillators owned by each voice.
pub const OSCS_PER_VOICE: usize = 2;

/// Total oscillator count.
pub const OSC_COUNT: usize = MAX_VOICES * OSCS_PER_VOICE;

/// Pending gate edges kept for the envelope collaborator.
pub const EDGE_QUEUE: usize = 8;

/// Default cutoff controller value (filter open).
pub const DEFAULT_CUTOFF: u8 = 127;

/// Upper bound of the 10-bit cutoff output.
pub const CUTOFF_MAX: i16 = 1023;

/// Voice allocation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceMode {
    /// Every oscillator stacked on one note.
    Mono,
    /// Up to [`MAX_VOICES`] independent notes, two oscillators each.
    Poly,
}

/// Edge sent to the external analog envelope generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEdge {
    Trigger,
    Release,
}

/// Receiver of note events. The sequencer plays through this, so tests can
/// record what it emits.
pub trait NoteSink {
    fn note_on(&mut self, note: u8, velocity: u8);
    fn note_off(&mut self, note: u8);
    fn all_notes_off(&mut self);
}

/// One note slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voice {
    /// Held note, `None` when the slot is free.
    pub note: Option<u8>,
    /// Last note assigned; keeps pitching the release tail.
    pub pitch_note: u8,
    /// Oscillators of this voice are audible.
    pub sounding: bool,
    glide: Glide,
    /// Phase increment computed at the last block.
    pub increment: u32,
}

impl Voice {
    fn new(glide_shift: u32) -> Self {
        Self {
            note: None,
            pitch_note: 0,
            sounding: false,
            glide: Glide::new(glide_shift),
            increment: 0,
        }
    }

    fn silence(&mut self) {
        self.note = None;
        self.sounding = false;
        self.increment = 0;
    }
}

/// The oscillator bank and its voice allocator.
pub struct VoiceEngine {
    table: PitchTable,
    voices: [Voice; MAX_VOICES],
    oscs: [Oscillator; OSC_COUNT],
    waveform: Waveform,
    flags: SystemFlags,
    bend: i32,
    bend_value: i16,
    bend_range: u8,
    tuning_trim: i8,
    cutoff: u8,
    track: i16,
    gate_open: bool,
    edges: Deque<GateEdge, EDGE_QUEUE>,
}

impl VoiceEngine {
    /// Create an engine rendering at `sample_rate` with the given glide shift.
    pub fn new(sample_rate: u32, glide_shift: u32) -> Self {
        let mut engine = Self {
            table: PitchTable::new(sample_rate),
            voices: [Voice::new(glide_shift); MAX_VOICES],
            oscs: [Oscillator::silent(); OSC_COUNT],
            waveform: Waveform::Mono(0),
            flags: SystemFlags::empty(),
            bend: 0,
            bend_value: 0,
            bend_range: 2,
            tuning_trim: 0,
            cutoff: DEFAULT_CUTOFF,
            track: 0,
            gate_open: false,
            edges: Deque::new(),
        };
        engine.load_patch();
        engine
    }

    pub fn mode(&self) -> VoiceMode {
        if self.waveform.is_poly() {
            VoiceMode::Poly
        } else {
            VoiceMode::Mono
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn voices(&self) -> &[Voice; MAX_VOICES] {
        &self.voices
    }

    pub fn oscillators(&self) -> &[Oscillator; OSC_COUNT] {
        &self.oscs
    }

    /// Number of slots holding a note.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.note.is_some()).count()
    }

    pub fn set_flags(&mut self, flags: SystemFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> SystemFlags {
        self.flags
    }

    pub fn set_tuning_trim(&mut self, trim: i8) {
        self.tuning_trim = trim;
    }

    /// Change the bend range and rescale the current bend.
    pub fn set_bend_range(&mut self, semitones: u8) {
        self.bend_range = semitones;
        self.bend = pitch::bend_offset(self.bend_value, semitones);
    }

    /// Centered 14-bit pitch bend (-8192..=8191).
    pub fn set_bend(&mut self, value: i16) {
        self.bend_value = value;
        self.bend = pitch::bend_offset(value, self.bend_range);
    }

    /// Base filter cutoff (controller value 0-127).
    pub fn set_cutoff(&mut self, value: u8) {
        self.cutoff = value & 0x7F;
    }

    /// Bend back to center, cutoff back to open.
    pub fn reset_controllers(&mut self) {
        self.set_bend(0);
        self.cutoff = DEFAULT_CUTOFF;
    }

    /// Cutoff CV value: base plus keyboard tracking, clamped to 10 bits.
    pub fn cutoff_output(&self) -> u16 {
        let mut value = self.cutoff as i16 * 8;
        if self.flags.contains(SystemFlags::TRACK) {
            value += self.track;
        }
        value.clamp(0, CUTOFF_MAX) as u16
    }

    /// Current keyboard tracking offset.
    pub fn track_offset(&self) -> i16 {
        self.track
    }

    /// Is the envelope gate held open?
    pub fn gate_is_open(&self) -> bool {
        self.gate_open
    }

    /// Oldest unconsumed gate edge.
    pub fn take_edge(&mut self) -> Option<GateEdge> {
        self.edges.pop_front()
    }

    /// Select a waveform by program number. Crossing between the mono and
    /// poly families silences everything first.
    pub fn set_waveform(&mut self, id: u8) {
        let next = Waveform::from_id(id);
        if next.is_poly() != self.waveform.is_poly() {
            log::debug!("voice mode -> {:?}", next);
            self.all_sounds_off();
            self.waveform = next;
            self.load_patch();
            return;
        }
        self.waveform = next;
        self.retune_patch();
    }

    /// Switch mono/poly, keeping the patch number.
    pub fn toggle_mode(&mut self) {
        self.set_waveform(self.waveform.toggled().id());
    }

    /// Force a mode, keeping the patch number. No-op if already there.
    pub fn set_mode(&mut self, mode: VoiceMode) {
        if self.mode() != mode {
            self.toggle_mode();
        }
    }

    /// Start a note.
    pub fn note_on(&mut self, note: u8, _velocity: u8) {
        let note = note & 0x7F;
        match self.mode() {
            VoiceMode::Mono => {
                let glide = self.flags.contains(SystemFlags::GLIDE) && self.voices[0].sounding;
                self.assign(0, note, glide);
                for (osc, preset) in self.oscs[..MONO_OSCS]
                    .iter_mut()
                    .zip(MONO_PATCHES[self.waveform.patch()].iter())
                {
                    osc.apply(preset);
                }
                self.push_edge(GateEdge::Trigger);
            }
            VoiceMode::Poly => {
                let was_active = self.active_count() > 0;
                if !was_active {
                    for voice in self.voices.iter_mut() {
                        voice.silence();
                    }
                }
                let Some(slot) = self.voices.iter().position(|v| v.note.is_none()) else {
                    return;
                };
                let glide =
                    self.flags.contains(SystemFlags::GLIDE) && self.voices[slot].sounding;
                self.assign(slot, note, glide);
                let patch = &POLY_PATCHES[self.waveform.patch()];
                let base = slot * OSCS_PER_VOICE;
                for (osc, preset) in self.oscs[base..base + POLY_OSCS].iter_mut().zip(patch) {
                    osc.apply(preset);
                }
                if !was_active || self.flags.contains(SystemFlags::RETRIGGER) {
                    self.push_edge(GateEdge::Trigger);
                }
            }
        }
        self.update_tracking();
    }

    /// Release every slot holding `note`. The oscillators keep running so
    /// the analog release tail stays audible.
    pub fn note_off(&mut self, note: u8) {
        let note = note & 0x7F;
        let mut released = false;
        for voice in self.voices.iter_mut() {
            if voice.note == Some(note) {
                voice.note = None;
                released = true;
            }
        }
        if released && self.active_count() == 0 && self.gate_open {
            self.push_edge(GateEdge::Release);
        }
        self.update_tracking();
    }

    /// Free every slot and close the gate.
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.note = None;
        }
        if self.gate_open {
            self.push_edge(GateEdge::Release);
        }
    }

    /// Free every slot and stop every oscillator.
    pub fn all_sounds_off(&mut self) {
        self.all_notes_off();
        for voice in self.voices.iter_mut() {
            voice.silence();
        }
    }

    /// Render interleaved frames into `out` (left, right). The left channel
    /// is silent; the right carries the mix of every sounding voice. Glide
    /// advances once per call.
    pub fn render(&mut self, out: &mut [i16]) {
        self.update_pitch();

        // Oscillator steps are fixed for the whole block.
        let mut steps = [0u32; OSC_COUNT];
        let mut live = [0usize; OSC_COUNT];
        let mut live_count = 0;
        let mono = self.mode() == VoiceMode::Mono;
        for (i, (step, osc)) in steps.iter_mut().zip(self.oscs.iter()).enumerate() {
            let voice = &self.voices[if mono { 0 } else { i / OSCS_PER_VOICE }];
            if voice.sounding {
                *step = osc.step_for(voice.increment);
                live[live_count] = i;
                live_count += 1;
            }
        }
        let live = &live[..live_count];

        for frame in out.chunks_exact_mut(2) {
            let mut mix = 0i32;
            for &i in live {
                mix += self.oscs[i].tick(steps[i]);
            }
            frame[0] = 0;
            frame[1] = mix.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
    }

    fn assign(&mut self, slot: usize, note: u8, glide: bool) {
        let target = pitch::target_pitch(note, self.bend, self.tuning_trim);
        let voice = &mut self.voices[slot];
        voice.note = Some(note);
        voice.pitch_note = note;
        if !glide {
            voice.glide.reset(target);
        }
        voice.increment = self.table.increment(voice.glide.value());
        voice.sounding = true;
    }

    fn update_pitch(&mut self) {
        let glide = self.flags.contains(SystemFlags::GLIDE);
        for voice in self.voices.iter_mut().filter(|v| v.sounding) {
            let target = pitch::target_pitch(voice.pitch_note, self.bend, self.tuning_trim);
            let played = if glide {
                voice.glide.step(target)
            } else {
                voice.glide.reset(target);
                target
            };
            voice.increment = self.table.increment(played);
        }
    }

    fn update_tracking(&mut self) {
        let held = self.voices.iter().filter_map(|v| v.note);
        if let Some(track) = pitch::track_offset(held) {
            self.track = track;
        }
    }

    fn push_edge(&mut self, edge: GateEdge) {
        self.gate_open = edge == GateEdge::Trigger;
        if self.edges.is_full() {
            self.edges.pop_front();
        }
        let _ = self.edges.push_back(edge);
    }

    /// Restart every oscillator from the current patch.
    fn load_patch(&mut self) {
        let patch = self.waveform.patch();
        match self.mode() {
            VoiceMode::Mono => {
                for (i, osc) in self.oscs.iter_mut().enumerate() {
                    match MONO_PATCHES[patch].get(i) {
                        Some(preset) => osc.apply(preset),
                        None => *osc = Oscillator::silent(),
                    }
                }
            }
            VoiceMode::Poly => {
                for (i, osc) in self.oscs.iter_mut().enumerate() {
                    osc.apply(&POLY_PATCHES[patch][i % OSCS_PER_VOICE]);
                }
            }
        }
    }

    /// Apply a patch of the same family to running oscillators. Each
    /// group's lead keeps its phase; the others take the new patch's
    /// phase offset relative to the lead.
    fn retune_patch(&mut self) {
        let patch = self.waveform.patch();
        match self.mode() {
            VoiceMode::Mono => {
                if self.voices[0].sounding {
                    retune_group(&mut self.oscs[..MONO_OSCS], &MONO_PATCHES[patch]);
                } else {
                    self.load_patch();
                }
            }
            VoiceMode::Poly => {
                for (v, voice) in self.voices.iter().enumerate() {
                    let group = &mut self.oscs[v * OSCS_PER_VOICE..(v + 1) * OSCS_PER_VOICE];
                    if voice.sounding {
                        retune_group(group, &POLY_PATCHES[patch]);
                    } else {
                        for (osc, preset) in group.iter_mut().zip(POLY_PATCHES[patch].iter()) {
                            osc.apply(preset);
                        }
                    }
                }
            }
        }
    }
}

fn retune_group(oscs: &mut [Oscillator], presets: &[OscPreset]) {
    let lead_phase = oscs[0].phase;
    let lead_preset = presets[0].phase;
    for (osc, preset) in oscs.iter_mut().zip(presets.iter()) {
        if preset.rate == 0 {
            osc.apply(preset);
            continue;
        }
        osc.retune(preset);
        osc.phase = lead_phase.wrapping_add(preset.phase.wrapping_sub(lead_preset));
    }
}

impl NoteSink for VoiceEngine {
    fn note_on(&mut self, note: u8, velocity: u8) {
        VoiceEngine::note_on(self, note, velocity);
    }

    fn note_off(&mut self, note: u8) {
        VoiceEngine::note_off(self, note);
    }

    fn all_notes_off(&mut self) {
        VoiceEngine::all_notes_off(self);
    }
}
