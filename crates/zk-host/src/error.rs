//! Host error type.

use zk_audio::AudioError;
use zk_store::StoreError;

/// Error type for controller operations.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Playback is not running, or its event queue is full.
    #[error("control event dropped")]
    EventDropped,
}
