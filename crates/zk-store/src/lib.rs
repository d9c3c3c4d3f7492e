//! Flash persistence for the zekit synthesizer.
//!
//! Patterns and global settings are stored as checksummed binary records
//! in fixed flash pages. The store only needs three flash primitives
//! ([`FlashStorage`]); [`MemoryFlash`] provides them in RAM for the host
//! build and tests.

mod error;
mod flash;
pub mod layout;
pub mod record;
mod store;

pub use error::{FlashError, RecordError, Result, StoreError};
pub use flash::{FlashStorage, MemoryFlash};
pub use store::PatternStore;
