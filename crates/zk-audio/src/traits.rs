//! Audio output trait and error types.

use zk_engine::Frame;

/// Error type for audio operations.
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// Failed to initialize audio device
    #[error("Device init error: {0}")]
    DeviceInit(String),
    /// Failed to create audio stream
    #[error("Stream create error: {0}")]
    StreamCreate(String),
    /// Playback error
    #[error("Playback error: {0}")]
    Playback(String),
    /// No audio device available
    #[error("No audio device available")]
    NoDevice,
}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Device sample rate.
    fn sample_rate(&self) -> u32;

    /// Queue frames for output. Returns how many were accepted; the rest
    /// are dropped when the buffer is full.
    fn write(&mut self, frames: &[Frame]) -> usize;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
