//! Persistence seam between the sequencer and non-volatile storage.

use core::fmt::Debug;

use crate::pattern::Pattern;
use crate::settings::Settings;

/// Non-volatile home of the pattern bank and the global settings.
///
/// Implemented by the flash store; the engine only sees this trait.
pub trait PatternBank {
    /// Error raised by a failed write.
    type Error: Debug;

    /// Overwrite entries of `patterns` with the stored copies. Slots without
    /// a valid stored record keep their current value. Returns the number of
    /// patterns loaded.
    fn load_patterns(&mut self, patterns: &mut [Pattern]) -> usize;

    /// Persist one pattern under its `id`.
    fn save_pattern(&mut self, pattern: &Pattern) -> Result<(), Self::Error>;

    /// Stored settings, if a valid record exists.
    fn load_settings(&mut self) -> Option<Settings>;

    /// Persist settings. Returns `Ok(false)` when the stored copy already
    /// matched and nothing was written.
    fn save_settings(&mut self, settings: &Settings) -> Result<bool, Self::Error>;
}

/// A bank that stores nothing. Used when running without flash.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBank;

impl PatternBank for NullBank {
    type Error = core::convert::Infallible;

    fn load_patterns(&mut self, _patterns: &mut [Pattern]) -> usize {
        0
    }

    fn save_pattern(&mut self, _pattern: &Pattern) -> Result<(), Self::Error> {
        Ok(())
    }

    fn load_settings(&mut self) -> Option<Settings> {
        None
    }

    fn save_settings(&mut self, _settings: &Settings) -> Result<bool, Self::Error> {
        Ok(false)
    }
}
