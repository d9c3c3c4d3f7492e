//! WAV encoding for 16-bit stereo PCM.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use zk_engine::Frame;

fn spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_frames<W: Write + Seek>(
    writer: W,
    frames: &[Frame],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let mut wav = hound::WavWriter::new(writer, spec(sample_rate))?;
    for frame in frames {
        wav.write_sample(frame.left)?;
        wav.write_sample(frame.right)?;
    }
    wav.finalize()
}

/// Write frames to a WAV file.
pub fn write_wav(path: &Path, frames: &[Frame], sample_rate: u32) -> Result<(), hound::Error> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_frames(file, frames, sample_rate)
}

/// Encode frames as an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_frames(&mut cursor, frames, sample_rate)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_holds_both_channels() {
        let frames = [
            Frame { left: 0, right: 1000 },
            Frame { left: 0, right: -1000 },
        ];
        let bytes = frames_to_wav(&frames, 48_000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, 0, -1000]);
    }
}
