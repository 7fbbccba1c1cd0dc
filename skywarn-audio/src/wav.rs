//! WAV file I/O on top of hound.
//!
//! Disk format is 16-bit PCM; in memory everything is f32.

use crate::buffer::AudioBuffer;
use crate::{AudioError, Result};
use std::path::Path;

/// Load a WAV file into an `AudioBuffer`, widening whatever bit depth the
/// file carries into f32.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<std::result::Result<_, _>>()?,
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / i8::MAX as f32))
                .collect::<std::result::Result<_, _>>()?,
            24 | 32 => {
                let shift = 32 - spec.bits_per_sample;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v << shift) as f32 / i32::MAX as f32))
                    .collect::<std::result::Result<_, _>>()?
            }
            bits => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{}-bit WAV",
                    bits
                )))
            }
        },
    };

    AudioBuffer::new(samples, spec.sample_rate, spec.channels)
}

/// Write an `AudioBuffer` as 16-bit PCM WAV.
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in buffer.samples() {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}
