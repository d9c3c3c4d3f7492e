//! Flash primitives and an in-memory NOR flash.

use crate::error::FlashError;
use crate::layout::{page_of, ERASED_WORD, FLASH_END, FLASH_START, PAGE_SIZE, WORD_SIZE};

/// The three operations the store needs from a flash controller.
///
/// Addresses are absolute and word aligned. Writes follow NOR rules: a
/// word can only be programmed from the erased state.
pub trait FlashStorage {
    /// Read one word.
    fn read_word(&self, addr: u32) -> Result<u32, FlashError>;

    /// Program one word.
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), FlashError>;

    /// Erase the page containing `addr` back to [`ERASED_WORD`].
    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError>;
}

impl<F: FlashStorage + ?Sized> FlashStorage for &mut F {
    fn read_word(&self, addr: u32) -> Result<u32, FlashError> {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), FlashError> {
        (**self).write_word(addr, value)
    }

    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError> {
        (**self).erase_page(addr)
    }
}

/// RAM-backed flash covering the settings and pattern pages.
///
/// Counts erases and writes, and can inject erase faults.
#[derive(Clone, Debug)]
pub struct MemoryFlash {
    start: u32,
    words: Vec<u32>,
    erase_count: usize,
    write_count: usize,
    fail_erase: bool,
    stuck: Option<(u32, u32)>,
}

impl Default for MemoryFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFlash {
    /// A fully erased device.
    pub fn new() -> Self {
        Self::with_range(FLASH_START, FLASH_END)
    }

    /// A fully erased device spanning `start..end`.
    pub fn with_range(start: u32, end: u32) -> Self {
        let len = (end.saturating_sub(start) / WORD_SIZE) as usize;
        Self {
            start,
            words: vec![ERASED_WORD; len],
            erase_count: 0,
            write_count: 0,
            fail_erase: false,
            stuck: None,
        }
    }

    /// Load a raw little-endian image of the default range. A short image
    /// leaves the remainder erased; extra bytes are ignored.
    pub fn from_image(bytes: &[u8]) -> Self {
        let mut flash = Self::new();
        for (word, chunk) in flash.words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        flash
    }

    /// Raw little-endian image.
    pub fn to_image(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Make the next erase report a failure.
    pub fn fail_next_erase(&mut self) {
        self.fail_erase = true;
    }

    /// Make one word keep `value` through erases.
    pub fn stick_word(&mut self, addr: u32, value: u32) {
        self.stuck = Some((addr, value));
        if let Ok(i) = self.index(addr) {
            self.words[i] = value;
        }
    }

    /// Overwrite a word ignoring NOR rules (simulates corruption).
    pub fn corrupt_word(&mut self, addr: u32, value: u32) {
        if let Ok(i) = self.index(addr) {
            self.words[i] = value;
        }
    }

    fn index(&self, addr: u32) -> Result<usize, FlashError> {
        if addr % WORD_SIZE != 0 {
            return Err(FlashError::Misaligned { addr });
        }
        let end = self.start + self.words.len() as u32 * WORD_SIZE;
        if addr < self.start || addr >= end {
            return Err(FlashError::OutOfRange { addr });
        }
        Ok(((addr - self.start) / WORD_SIZE) as usize)
    }
}

impl FlashStorage for MemoryFlash {
    fn read_word(&self, addr: u32) -> Result<u32, FlashError> {
        Ok(self.words[self.index(addr)?])
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), FlashError> {
        let i = self.index(addr)?;
        let old = self.words[i];
        if old & value != value {
            return Err(FlashError::NotErased { addr });
        }
        self.words[i] = old & value;
        self.write_count += 1;
        Ok(())
    }

    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError> {
        let page = page_of(addr);
        let first = self.index(page)?;
        if std::mem::take(&mut self.fail_erase) {
            return Err(FlashError::EraseFailed { page });
        }
        let count = (PAGE_SIZE / WORD_SIZE) as usize;
        let last = (first + count).min(self.words.len());
        self.words[first..last].fill(ERASED_WORD);
        if let Some((stuck_addr, value)) = self.stuck {
            if page_of(stuck_addr) == page {
                if let Ok(i) = self.index(stuck_addr) {
                    self.words[i] = value;
                }
            }
        }
        self.erase_count += 1;
        Ok(())
    }
}
