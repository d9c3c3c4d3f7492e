//! Note-to-increment conversion, pitch bend, glide and cutoff tracking.
//!
//! Pitches are handled in a "coarse.fine" fixed-point form: the upper bits
//! are a MIDI note number and the low [`FINE_BITS`] bits a fraction of a
//! semitone. The phase increment for a pitch comes from a 12-entry table
//! for the topmost octave, shifted right once per octave below it.

/// Fractional bits of a coarse.fine pitch.
pub const FINE_BITS: u32 = 8;

/// Highest note the increment table can represent (B-8).
pub const TOP_NOTE: u8 = 119;

/// Highest representable coarse.fine pitch. Anything above is silent.
pub const PITCH_MAX: i32 = (TOP_NOTE as i32) << FINE_BITS;

/// Default glide smoothing shift.
pub const GLIDE_SHIFT: u32 = 2;

/// Largest glide shift that keeps the accumulator inside an `i32`.
pub const MAX_GLIDE_SHIFT: u32 = 15;

/// Octave index of the table octave (notes 108-119).
const TABLE_OCTAVE: u32 = 9;

/// First note of the table octave (C-8).
const TABLE_BASE_NOTE: i32 = 108;

/// Phase scale of the table: increments are `2^24 * f / sample_rate`.
const TABLE_SCALE: f64 = 16_777_216.0;

/// Keyboard tracking reference note.
pub const TRACK_REF: u8 = 60;

/// Keyboard tracking note range.
pub const TRACK_LOW: u8 = 28;
pub const TRACK_HIGH: u8 = 91;

/// Cutoff units per semitone of keyboard tracking.
pub const TRACK_SCALE: i16 = 8;

/// Per-octave increment table, computed once for the topmost octave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PitchTable {
    top: [u32; 12],
}

impl PitchTable {
    /// Build the table for the given output sample rate.
    pub fn new(sample_rate: u32) -> Self {
        let mut top = [0u32; 12];
        if sample_rate == 0 {
            return Self { top };
        }
        for (degree, inc) in top.iter_mut().enumerate() {
            let note = TABLE_BASE_NOTE + degree as i32;
            let freq = 440.0 * libm::exp2((note - 69) as f64 / 12.0);
            *inc = (TABLE_SCALE * freq / sample_rate as f64) as u32;
        }
        Self { top }
    }

    /// Phase increment of a whole note. Notes above [`TOP_NOTE`] give 0.
    pub fn note_increment(&self, note: u8) -> u32 {
        if note > TOP_NOTE {
            return 0;
        }
        let octave = (note / 12) as u32;
        let degree = (note % 12) as usize;
        self.top[degree] >> (TABLE_OCTAVE - octave)
    }

    /// Phase increment of a coarse.fine pitch.
    ///
    /// The fraction interpolates linearly between adjacent semitones.
    /// Pitches above [`PITCH_MAX`] are silenced (increment 0) instead of
    /// wrapping; negative pitches clamp to note 0.
    pub fn increment(&self, pitch: i32) -> u32 {
        if pitch > PITCH_MAX {
            return 0;
        }
        let pitch = pitch.max(0);
        let coarse = (pitch >> FINE_BITS) as u8;
        let fine = (pitch & ((1 << FINE_BITS) - 1)) as u32;
        let i1 = self.note_increment(coarse);
        if fine == 0 {
            return i1;
        }
        let i2 = self.note_increment(coarse + 1);
        i1 + (((i2 - i1) as u64 * fine as u64) >> FINE_BITS) as u32
    }
}

/// Convert a centered 14-bit bend value into a coarse.fine offset for a
/// bend range of `range` semitones.
pub fn bend_offset(value: i16, range: u8) -> i32 {
    // value / 8192 * range * 256
    (value as i32 * range as i32) >> 5
}

/// Target coarse.fine pitch of `note` with bend and tuning applied.
pub fn target_pitch(note: u8, bend: i32, tuning_trim: i8) -> i32 {
    ((note as i32) << FINE_BITS) + bend + tuning_trim as i32
}

/// One-pole portamento filter on coarse.fine pitches.
///
/// `accum += target - (accum >> shift)`; the played pitch is
/// `accum >> shift`. Integer truncation is part of the sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Glide {
    accum: i32,
    shift: u32,
}

impl Glide {
    /// A glide settled on pitch 0.
    pub const fn new(shift: u32) -> Self {
        Self { accum: 0, shift }
    }

    /// Jump straight to `target` with no transition.
    pub fn reset(&mut self, target: i32) {
        self.accum = target << self.shift;
    }

    /// Advance one update toward `target` and return the pitch to play.
    pub fn step(&mut self, target: i32) -> i32 {
        self.accum += target - (self.accum >> self.shift);
        self.accum >> self.shift
    }

    /// Current played pitch.
    pub fn value(&self) -> i32 {
        self.accum >> self.shift
    }

    /// Raw accumulator (pitch scaled by `2^shift`).
    pub fn accumulator(&self) -> i32 {
        self.accum
    }
}

/// Keyboard-tracking cutoff offset for a set of sounding notes: the highest
/// `(clamp(note) - TRACK_REF) * TRACK_SCALE`. `None` for an empty set.
pub fn track_offset<I: IntoIterator<Item = u8>>(notes: I) -> Option<i16> {
    notes
        .into_iter()
        .map(|n| (n.clamp(TRACK_LOW, TRACK_HIGH) as i16 - TRACK_REF as i16) * TRACK_SCALE)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 200_000;

    #[test]
    fn a8_matches_reference_increment() {
        // 2^24 * 7040 / 200000 = 590558.003
        let table = PitchTable::new(SAMPLE_RATE);
        assert_eq!(table.note_increment(117), 590_558);
    }

    #[test]
    fn octave_down_halves_exactly() {
        let table = PitchTable::new(SAMPLE_RATE);
        for note in 0..(TOP_NOTE - 11) {
            let low = table.note_increment(note);
            let high = table.note_increment(note + 12);
            assert_eq!(low, high >> 1, "note {}", note);
        }
    }

    #[test]
    fn increment_rises_within_octave() {
        let table = PitchTable::new(SAMPLE_RATE);
        for octave in 0..10u8 {
            let base = octave * 12;
            for degree in 0..11u8 {
                let note = base + degree;
                assert!(
                    table.note_increment(note) <= table.note_increment(note + 1),
                    "note {}",
                    note
                );
            }
        }
    }

    #[test]
    fn notes_above_table_are_silent() {
        let table = PitchTable::new(SAMPLE_RATE);
        assert!(table.note_increment(TOP_NOTE) > 0);
        assert_eq!(table.note_increment(120), 0);
        assert_eq!(table.note_increment(127), 0);
        assert_eq!(table.increment(PITCH_MAX + 1), 0);
        assert_eq!(table.increment(PITCH_MAX), table.note_increment(TOP_NOTE));
    }

    #[test]
    fn fraction_interpolates_between_semitones() {
        let table = PitchTable::new(SAMPLE_RATE);
        let i1 = table.note_increment(60);
        let i2 = table.note_increment(61);
        let half = table.increment((60 << FINE_BITS) + 128);
        assert_eq!(half, i1 + ((i2 - i1) * 128 >> 8));
        assert!(half > i1 && half < i2);
    }

    #[test]
    fn negative_pitch_clamps_to_note_zero() {
        let table = PitchTable::new(SAMPLE_RATE);
        assert_eq!(table.increment(-500), table.note_increment(0));
    }

    #[test]
    fn bend_range_scales_to_fraction() {
        assert_eq!(bend_offset(0, 2), 0);
        assert_eq!(bend_offset(8192, 2), 512);
        assert_eq!(bend_offset(-8192, 2), -512);
        assert_eq!(bend_offset(4096, 12), 1536);
    }

    #[test]
    fn glide_converges_on_target() {
        let mut glide = Glide::new(GLIDE_SHIFT);
        glide.reset(48 << FINE_BITS);
        let target = 60 << FINE_BITS;
        let mut last_err = ((target << GLIDE_SHIFT) - glide.accumulator()).abs();
        for _ in 0..200 {
            glide.step(target);
            let err = ((target << GLIDE_SHIFT) - glide.accumulator()).abs();
            if last_err >= 1 << GLIDE_SHIFT {
                assert!(err < last_err);
            }
            last_err = err;
        }
        assert_eq!(glide.value(), target);
    }

    #[test]
    fn glide_converges_downward() {
        let mut glide = Glide::new(GLIDE_SHIFT);
        glide.reset(72 << FINE_BITS);
        let target = 36 << FINE_BITS;
        let mut last = glide.value();
        for _ in 0..200 {
            let v = glide.step(target);
            assert!(v <= last);
            last = v;
        }
        assert!((glide.value() - target).abs() <= 1);
    }

    #[test]
    fn glide_truncates_like_integer_filter() {
        let mut glide = Glide::new(2);
        // accum = 0 + 100 - 0 = 100, played = 25
        assert_eq!(glide.step(100), 25);
        // accum = 100 + 100 - 25 = 175, played = 43
        assert_eq!(glide.step(100), 43);
    }

    #[test]
    fn tracking_uses_highest_clamped_note() {
        assert_eq!(track_offset([]), None);
        assert_eq!(track_offset([60]), Some(0));
        assert_eq!(track_offset([48, 72]), Some(12 * TRACK_SCALE));
        assert_eq!(track_offset([127]), Some((91 - 60) * TRACK_SCALE));
        assert_eq!(track_offset([0]), Some((28 - 60) * TRACK_SCALE));
    }
}
