//! Pattern, step and cell types for the step sequencer.

use arrayvec::ArrayVec;

/// Number of patterns held in memory (and in flash).
pub const MAX_PATTERNS: usize = 16;

/// Maximum number of steps in a pattern.
pub const MAX_STEPS: usize = 96;

/// Simultaneous note slots per step (chords).
pub const NOTES_PER_STEP: usize = 4;

/// Default root note of a fresh pattern (C-3).
pub const NOTE_BASE: u8 = 48;

/// Raw encoding of an empty cell.
pub const CELL_EMPTY: u8 = 0x80;

/// Raw encoding of a tie cell.
pub const CELL_TIE: u8 = 0x81;

/// One note slot of a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cell {
    /// Rest: release whatever sounds in this slot.
    #[default]
    Empty,
    /// Sustain the note of the previous step in this slot.
    Tie,
    /// Play a MIDI note (0-127).
    Note(u8),
}

impl Cell {
    /// Decode a raw cell byte. Returns `None` for bytes that are neither a
    /// note nor one of the two sentinels.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0..=127 => Some(Cell::Note(raw)),
            CELL_EMPTY => Some(Cell::Empty),
            CELL_TIE => Some(Cell::Tie),
            _ => None,
        }
    }

    /// Encode this cell as its raw byte.
    pub const fn to_raw(self) -> u8 {
        match self {
            Cell::Note(n) => n & 0x7F,
            Cell::Empty => CELL_EMPTY,
            Cell::Tie => CELL_TIE,
        }
    }

    /// The note number if this cell plays a note.
    pub const fn note(self) -> Option<u8> {
        match self {
            Cell::Note(n) => Some(n),
            _ => None,
        }
    }
}

/// A sequencer step: up to [`NOTES_PER_STEP`] cells played together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Step {
    cells: [Cell; NOTES_PER_STEP],
}

impl Step {
    /// A rest step.
    pub const EMPTY: Step = Step {
        cells: [Cell::Empty; NOTES_PER_STEP],
    };

    /// A step that sustains every slot.
    pub const TIE: Step = Step {
        cells: [Cell::Tie; NOTES_PER_STEP],
    };

    /// A step playing a single note in the lead slot.
    pub const fn note(note: u8) -> Self {
        let mut cells = [Cell::Empty; NOTES_PER_STEP];
        cells[0] = Cell::Note(note & 0x7F);
        Self { cells }
    }

    /// Build a step from explicit cells.
    pub const fn from_cells(cells: [Cell; NOTES_PER_STEP]) -> Self {
        Self { cells }
    }

    /// Cell at `slot`.
    pub fn cell(&self, slot: usize) -> Cell {
        self.cells[slot]
    }

    /// All cells of the step.
    pub fn cells(&self) -> &[Cell; NOTES_PER_STEP] {
        &self.cells
    }

    /// Note in the lead slot (slot 0), if any.
    pub fn lead(&self) -> Option<u8> {
        self.cells[0].note()
    }

    /// True when every cell is a rest.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| *c == Cell::Empty)
    }

    /// Put `note` into the first free slot. Returns the slot index, or
    /// `None` when the step already holds [`NOTES_PER_STEP`] notes.
    pub fn insert(&mut self, note: u8) -> Option<usize> {
        let slot = self.cells.iter().position(|c| *c == Cell::Empty)?;
        self.cells[slot] = Cell::Note(note & 0x7F);
        Some(slot)
    }
}

/// A recorded note pattern.
///
/// The step list is bounded by [`MAX_STEPS`]; every stored cell is a valid
/// note, a rest or a tie.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    /// Pattern slot (0..MAX_PATTERNS).
    pub id: u8,
    /// Note the pattern was recorded against; playback transposes by
    /// `key - root`.
    pub root: u8,
    /// Free-form flags persisted verbatim with the pattern.
    pub flags: u8,
    steps: ArrayVec<Step, MAX_STEPS>,
}

impl Pattern {
    /// The power-on pattern: a single C-3 step.
    pub fn new(id: u8) -> Self {
        let mut steps = ArrayVec::new();
        steps.push(Step::note(NOTE_BASE));
        Self {
            id,
            root: NOTE_BASE,
            flags: 0,
            steps,
        }
    }

    /// Rebuild a pattern from stored parts.
    ///
    /// Returns `None` if the step count is outside `1..=MAX_STEPS` or the
    /// id is not a valid pattern slot.
    pub fn from_steps(id: u8, root: u8, flags: u8, steps: &[Step]) -> Option<Self> {
        if steps.is_empty() || steps.len() > MAX_STEPS || id as usize >= MAX_PATTERNS {
            return None;
        }
        Some(Self {
            id,
            root: root & 0x7F,
            flags,
            steps: steps.iter().copied().collect(),
        })
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if no steps are recorded (only while recording).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True once [`MAX_STEPS`] steps are recorded.
    pub fn is_full(&self) -> bool {
        self.steps.is_full()
    }

    /// Step at `index`. Wraps around the pattern length.
    pub fn step(&self, index: usize) -> Step {
        if self.steps.is_empty() {
            return Step::EMPTY;
        }
        self.steps[index % self.steps.len()]
    }

    /// All recorded steps.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Append a step. Returns false when the pattern is full.
    pub fn push_step(&mut self, step: Step) -> bool {
        self.steps.try_push(step).is_ok()
    }

    /// Drop every step and reset the root, ready for recording.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.root = NOTE_BASE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_raw_encoding() {
        assert_eq!(Cell::from_raw(60), Some(Cell::Note(60)));
        assert_eq!(Cell::from_raw(CELL_EMPTY), Some(Cell::Empty));
        assert_eq!(Cell::from_raw(CELL_TIE), Some(Cell::Tie));
        assert_eq!(Cell::from_raw(0x82), None);
        assert_eq!(Cell::from_raw(0xFF), None);
        assert_eq!(Cell::Tie.to_raw(), CELL_TIE);
    }

    #[test]
    fn step_insert_fills_slots_in_order() {
        let mut step = Step::EMPTY;
        assert_eq!(step.insert(60), Some(0));
        assert_eq!(step.insert(64), Some(1));
        assert_eq!(step.insert(67), Some(2));
        assert_eq!(step.insert(71), Some(3));
        assert_eq!(step.insert(72), None);
        assert_eq!(step.lead(), Some(60));
        assert_eq!(step.cell(3), Cell::Note(71));
    }

    #[test]
    fn new_pattern_has_one_step() {
        let p = Pattern::new(3);
        assert_eq!(p.id, 3);
        assert_eq!(p.len(), 1);
        assert_eq!(p.step(0).lead(), Some(NOTE_BASE));
    }

    #[test]
    fn pattern_never_exceeds_max_steps() {
        let mut p = Pattern::new(0);
        p.clear();
        for i in 0..MAX_STEPS {
            assert!(p.push_step(Step::note(i as u8)));
        }
        assert!(p.is_full());
        assert!(!p.push_step(Step::EMPTY));
        assert_eq!(p.len(), MAX_STEPS);
    }

    #[test]
    fn step_index_wraps() {
        let mut p = Pattern::new(0);
        p.push_step(Step::note(50));
        assert_eq!(p.step(2).lead(), Some(NOTE_BASE));
        assert_eq!(p.step(3).lead(), Some(50));
    }

    #[test]
    fn from_steps_rejects_bad_lengths() {
        assert!(Pattern::from_steps(0, 48, 0, &[]).is_none());
        assert!(Pattern::from_steps(16, 48, 0, &[Step::EMPTY]).is_none());
        let long = [Step::EMPTY; MAX_STEPS + 1];
        assert!(Pattern::from_steps(0, 48, 0, &long).is_none());
        assert!(Pattern::from_steps(15, 48, 0, &long[..MAX_STEPS]).is_some());
    }
}
