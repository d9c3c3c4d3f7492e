//! Flash map of the pattern and settings pages.

use zk_ir::MAX_PATTERNS;

/// Bytes per flash word.
pub const WORD_SIZE: u32 = 4;

/// Value of an erased word.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Erase granularity.
pub const PAGE_SIZE: u32 = 2048;

/// Page holding the global settings.
pub const SETTINGS_PAGE: u32 = 0x7800;

/// First pattern page; pattern `p` lives at `PATTERN_BASE + p * PAGE_SIZE`.
pub const PATTERN_BASE: u32 = 0x8000;

/// Bytes reserved per pattern record.
pub const RECORD_SIZE: u32 = 512;

/// Pattern records per page.
pub const RECORDS_PER_PAGE: u32 = PAGE_SIZE / RECORD_SIZE;

/// Lowest address used by the store.
pub const FLASH_START: u32 = SETTINGS_PAGE;

/// One past the highest address used by the store.
pub const FLASH_END: u32 = PATTERN_BASE + MAX_PATTERNS as u32 * PAGE_SIZE;

/// Page of pattern `id`.
pub const fn pattern_page(id: u8) -> u32 {
    PATTERN_BASE + id as u32 * PAGE_SIZE
}

/// Address of record `slot` in `page`.
pub const fn record_addr(page: u32, slot: u32) -> u32 {
    page + slot * RECORD_SIZE
}

/// Page containing `addr`.
pub const fn page_of(addr: u32) -> u32 {
    addr & !(PAGE_SIZE - 1)
}
