//! Oscillator: a phase-accumulator saw with a signed rate and a level shift.

use crate::waves::OscPreset;

/// A single phase-accumulator oscillator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Oscillator {
    /// 32-bit wrapping phase.
    pub phase: u32,
    /// Signed multiplier of the voice increment (128 = unison).
    pub rate: i16,
    /// Right shift applied to the 16-bit output.
    pub shift: u8,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::silent()
    }
}

impl Oscillator {
    /// An oscillator that contributes nothing.
    pub const fn silent() -> Self {
        Self {
            phase: 0,
            rate: 0,
            shift: 16,
        }
    }

    /// Restart from a preset.
    pub fn apply(&mut self, preset: &OscPreset) {
        self.phase = preset.phase;
        self.rate = preset.rate;
        self.shift = preset.shift;
    }

    /// Take the preset's rate and level but keep the running phase.
    pub fn retune(&mut self, preset: &OscPreset) {
        self.rate = preset.rate;
        self.shift = preset.shift;
    }

    /// Per-sample phase step for a voice increment.
    #[inline]
    pub fn step_for(&self, voice_increment: u32) -> u32 {
        voice_increment.wrapping_mul(self.rate as i32 as u32)
    }

    /// Current output sample.
    #[inline]
    pub fn sample(&self) -> i32 {
        ((self.phase as i32) >> 16) >> self.shift
    }

    /// Emit the current sample, then advance by `step`.
    #[inline]
    pub fn tick(&mut self, step: u32) -> i32 {
        let out = self.sample();
        self.phase = self.phase.wrapping_add(step);
        out
    }
}
