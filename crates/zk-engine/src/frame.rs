//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Rebuild frames from an interleaved left/right buffer.
    pub fn copy_from_interleaved(frames: &mut [Frame], samples: &[i16]) {
        for (frame, pair) in frames.iter_mut().zip(samples.chunks_exact(2)) {
            frame.left = pair[0];
            frame.right = pair[1];
        }
    }

    /// The channel carrying the synth signal.
    pub const fn signal(&self) -> i16 {
        self.right
    }
}
