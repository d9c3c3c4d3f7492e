//! Static waveform patches.
//!
//! A patch is a set of oscillator presets whose outputs are summed. Sign
//! lives in the rate multiplier: a negative rate runs the saw downward, so
//! a pair of opposite saws offset in phase makes a square or pulse.

/// Starting state of one oscillator in a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OscPreset {
    /// Phase the oscillator restarts from.
    pub phase: u32,
    /// Signed multiplier applied to the note increment (128 = unison).
    pub rate: i16,
    /// Output attenuation as a right shift of the 16-bit sample.
    pub shift: u8,
}

impl OscPreset {
    /// An oscillator that never moves and contributes nothing audible.
    pub const SILENT: OscPreset = OscPreset::new(0, 0, 16);

    pub const fn new(phase: u32, rate: i16, shift: u8) -> Self {
        Self { phase, rate, shift }
    }
}

/// Number of patches in each family.
pub const PATCH_COUNT: usize = 8;

/// Oscillators per mono patch.
pub const MONO_OSCS: usize = 4;

/// Oscillators per poly voice.
pub const POLY_OSCS: usize = 2;

const fn p(phase: u32, rate: i16, shift: u8) -> OscPreset {
    OscPreset::new(phase, rate, shift)
}

const S: OscPreset = OscPreset::SILENT;

/// Mono patches: every voice of a single note.
pub const MONO_PATCHES: [[OscPreset; MONO_OSCS]; PATCH_COUNT] = [
    // saw
    [p(0, 128, 1), S, S, S],
    // detuned saw
    [p(0, 127, 2), p(0, 129, 2), p(0, 128, 2), S],
    // square
    [p(0, 128, 2), p(0x8000_0000, -128, 2), S, S],
    // detuned square
    [
        p(0, 127, 2),
        p(0x8000_0000, -127, 2),
        p(0, 129, 2),
        p(0x8000_0000, -129, 2),
    ],
    // pulse 25%
    [p(0, 128, 1), p(0x4000_0000, -128, 1), S, S],
    // saw plus octave
    [p(0, 128, 1), p(0, 256, 2), S, S],
    // pulse 10%
    [p(0, 128, 1), p(0x1800_0000, -128, 1), S, S],
    // ultrasaw
    [
        p(0, 127, 2),
        p(0, 130, 2),
        p(0, 128, 2),
        p(0x8000_0000, 256, 2),
    ],
];

/// Poly patches: the two oscillators of one voice.
pub const POLY_PATCHES: [[OscPreset; POLY_OSCS]; PATCH_COUNT] = [
    [p(0, 128, 3), S],
    [p(0, 255, 3), p(0x8000_0000, 257, 3)],
    [p(0, 128, 4), p(0x8000_0000, -128, 4)],
    [p(0, 128, 3), p(0x8000_0000, 64, 4)],
    [p(0, 128, 3), p(0x4000_0000, -128, 3)],
    [p(0, 256, 3), p(0x8000_0000, 127, 4)],
    [p(0, 128, 3), p(0x1800_0000, -128, 3)],
    [p(0, 129, 3), p(0x8000_0000, 127, 3)],
];

/// Waveform family of a patch id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Mono(u8),
    Poly(u8),
}

impl Waveform {
    /// Decode a program number: 0-7 mono, 8-15 poly. Higher ids wrap.
    pub fn from_id(id: u8) -> Self {
        let id = id % (2 * PATCH_COUNT as u8);
        if (id as usize) < PATCH_COUNT {
            Waveform::Mono(id)
        } else {
            Waveform::Poly(id - PATCH_COUNT as u8)
        }
    }

    /// Program number of this waveform.
    pub fn id(self) -> u8 {
        match self {
            Waveform::Mono(n) => n,
            Waveform::Poly(n) => n + PATCH_COUNT as u8,
        }
    }

    /// Patch index within its family.
    pub fn patch(self) -> usize {
        match self {
            Waveform::Mono(n) | Waveform::Poly(n) => n as usize % PATCH_COUNT,
        }
    }

    pub fn is_poly(self) -> bool {
        matches!(self, Waveform::Poly(_))
    }

    /// The same patch number in the other family.
    pub fn toggled(self) -> Self {
        match self {
            Waveform::Mono(n) => Waveform::Poly(n),
            Waveform::Poly(n) => Waveform::Mono(n),
        }
    }
}
