//! Error types for flash access and the pattern store.

/// Failure reported by a [`FlashStorage`](crate::FlashStorage) primitive.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Address outside the device.
    #[error("address {addr:#06x} is outside flash")]
    OutOfRange { addr: u32 },

    /// Address not on a word boundary.
    #[error("address {addr:#06x} is not word aligned")]
    Misaligned { addr: u32 },

    /// Programming would need to set bits that are already cleared.
    #[error("word at {addr:#06x} is not erased")]
    NotErased { addr: u32 },

    /// The controller reported an erase failure.
    #[error("erase of page {page:#06x} failed")]
    EraseFailed { page: u32 },
}

/// Error type for store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Error from the flash primitives
    #[error("Flash error: {0}")]
    Flash(#[from] FlashError),

    /// A page still held data after an erase
    #[error("page {page:#06x} did not erase cleanly")]
    EraseVerify { page: u32 },

    /// An earlier erase failed; nothing more is written
    #[error("store disabled after an erase failure")]
    Poisoned,

    /// Pattern id outside the bank
    #[error("pattern id {0} out of range")]
    BadPatternId(u8),

    /// Record encoding failed
    #[error("Record encoding error: {0}")]
    Encode(#[from] binrw::Error),
}

/// Why a stored record was rejected on load.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("slot is empty")]
    Empty,

    #[error("bad magic {0:#04x}")]
    BadMagic(u8),

    #[error("record id {found} in page of pattern {expected}")]
    WrongId { expected: u8, found: u8 },

    #[error("length {0} out of range")]
    BadLength(u8),

    #[error("invalid cell {value:#04x} at step {step}")]
    BadCell { step: usize, value: u8 },

    #[error("checksum mismatch")]
    Checksum,

    #[error("unreadable record: {0}")]
    Unreadable(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
