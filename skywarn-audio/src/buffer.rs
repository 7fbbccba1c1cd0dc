//! In-memory PCM audio values.
//!
//! `AudioBuffer` is an immutable audio value: every transform returns a new
//! buffer and never mutates the receiver, so buffers (e.g. a cached silence
//! pad) can be shared freely across concurrent announcement builds without
//! locking.

use crate::{AudioError, Result};
use std::ops::Add;

/// Interleaved f32 PCM audio with a sample rate and channel count.
///
/// Invariants: the sample array is non-empty, the channel count is 1 or 2,
/// and the sample count is a whole number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if samples.is_empty() {
            return Err(AudioError::InvalidBuffer("empty sample array".into()));
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidBuffer("zero sample rate".into()));
        }
        if channels != 1 && channels != 2 {
            return Err(AudioError::InvalidBuffer(format!(
                "unsupported channel count: {}",
                channels
            )));
        }
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Generate a mono silence buffer of the given duration.
    pub fn silent(duration_ms: u64, sample_rate: u32) -> Result<Self> {
        let num_samples = (duration_ms * sample_rate as u64 / 1000) as usize;
        if num_samples == 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "{} ms of silence at {} Hz yields no samples",
                duration_ms, sample_rate
            )));
        }
        Self::new(vec![0.0; num_samples], sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total interleaved sample count across all channels.
    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Resample to a target rate with linear interpolation.
    ///
    /// The output frame count is `round(frames * target / source)`; a result
    /// of zero frames is a hard error (target rate too low for this input).
    pub fn resample(&self, target_rate: u32) -> Result<Self> {
        if target_rate == self.sample_rate {
            return Ok(self.clone());
        }
        if target_rate == 0 {
            return Err(AudioError::InvalidBuffer("zero target rate".into()));
        }
        let frames = self.frames();
        let out_frames =
            (frames as f64 * target_rate as f64 / self.sample_rate as f64).round() as usize;
        if out_frames == 0 {
            return Err(AudioError::ResampleUnderflow {
                frames,
                from: self.sample_rate,
                to: target_rate,
            });
        }

        let ch = self.channels as usize;
        let mut out = Vec::with_capacity(out_frames * ch);
        for i in 0..out_frames {
            let pos = i as f64 * frames as f64 / out_frames as f64;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let idx = idx.min(frames - 1);
            let next = (idx + 1).min(frames - 1);
            for c in 0..ch {
                let a = self.samples[idx * ch + c];
                let b = self.samples[next * ch + c];
                out.push(a + (b - a) * frac);
            }
        }
        Self::new(out, target_rate, self.channels)
    }

    /// Downmix to mono by averaging channels.
    pub fn to_mono(&self) -> Self {
        if self.channels == 1 {
            return self.clone();
        }
        let mono: Vec<f32> = self
            .samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) / 2.0)
            .collect();
        Self {
            samples: mono,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Upmix to stereo by duplicating the mono channel.
    pub fn to_stereo(&self) -> Self {
        if self.channels == 2 {
            return self.clone();
        }
        let mut stereo = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            stereo.push(s);
            stereo.push(s);
        }
        Self {
            samples: stereo,
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }

    pub fn with_channels(&self, channels: u16) -> Result<Self> {
        match channels {
            1 => Ok(self.to_mono()),
            2 => Ok(self.to_stereo()),
            n => Err(AudioError::InvalidBuffer(format!(
                "unsupported channel count: {}",
                n
            ))),
        }
    }

    /// Peak-normalize into [-1, 1]. An all-zero buffer is returned unchanged.
    pub fn normalize(&self) -> Self {
        let max = self
            .samples
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        if max == 0.0 {
            return self.clone();
        }
        let scaled = self.samples.iter().map(|s| s / max).collect();
        Self {
            samples: scaled,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Concatenate, implicitly resampling and channel-converting the right
    /// operand to match the receiver.
    pub fn append(&self, other: &AudioBuffer) -> Result<Self> {
        let rhs = other.resample(self.sample_rate)?;
        let rhs = rhs.with_channels(self.channels)?;
        let mut samples = self.samples.clone();
        samples.extend_from_slice(rhs.samples());
        Self::new(samples, self.sample_rate, self.channels)
    }

    /// Append the given milliseconds of silence.
    pub fn append_silence(&self, duration_ms: u64) -> Result<Self> {
        let pad = AudioBuffer::silent(duration_ms, self.sample_rate)?;
        self.append(&pad)
    }
}

impl Add<&AudioBuffer> for &AudioBuffer {
    type Output = Result<AudioBuffer>;

    fn add(self, rhs: &AudioBuffer) -> Result<AudioBuffer> {
        self.append(rhs)
    }
}

/// Sugar: `buffer + 500` appends 500 ms of silence.
impl Add<u64> for &AudioBuffer {
    type Output = Result<AudioBuffer>;

    fn add(self, duration_ms: u64) -> Result<AudioBuffer> {
        self.append_silence(duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, rate: u32) -> AudioBuffer {
        let samples: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
        AudioBuffer::new(samples, rate, 1).unwrap()
    }

    #[test]
    fn rejects_empty_samples() {
        assert!(AudioBuffer::new(vec![], 8000, 1).is_err());
    }

    #[test]
    fn rejects_bad_channel_counts() {
        assert!(AudioBuffer::new(vec![0.0; 4], 8000, 3).is_err());
        assert!(AudioBuffer::new(vec![0.0; 3], 8000, 2).is_err());
    }

    #[test]
    fn resample_round_trip_preserves_length() {
        let buf = ramp(1000, 8000);
        let up = buf.resample(16000).unwrap();
        assert_eq!(up.frames(), 2000);
        let back = up.resample(8000).unwrap();
        let diff = (back.frames() as i64 - 1000).abs();
        assert!(diff <= 1, "round trip drifted by {} frames", diff);
    }

    #[test]
    fn resample_to_zero_frames_is_an_error() {
        let buf = ramp(4, 48000);
        match buf.resample(1) {
            Err(AudioError::ResampleUnderflow { .. }) => {}
            other => panic!("expected ResampleUnderflow, got {:?}", other),
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let buf = AudioBuffer::new(vec![0.1, -0.5, 0.25], 8000, 1).unwrap();
        let once = buf.normalize();
        let twice = once.normalize();
        assert_eq!(once, twice);
        assert!((once.samples().iter().fold(0.0f32, |a, s| a.max(s.abs())) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_silence_alone() {
        let buf = AudioBuffer::silent(100, 8000).unwrap();
        assert_eq!(buf.normalize(), buf);
    }

    #[test]
    fn mono_downmix_averages() {
        let buf = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 8000, 2).unwrap();
        let mono = buf.to_mono();
        assert_eq!(mono.samples(), &[0.5, 0.5]);
        assert_eq!(mono.channels(), 1);
    }

    #[test]
    fn silence_sugar_extends_duration() {
        let buf = ramp(8000, 8000);
        let padded = (&buf + 500).unwrap();
        assert_eq!(padded.frames(), 8000 + 4000);
        assert!((padded.duration_seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn append_converts_rate_and_channels() {
        let a = ramp(100, 8000);
        let b = ramp(100, 16000).to_stereo();
        let joined = (&a + &b).unwrap();
        assert_eq!(joined.sample_rate(), 8000);
        assert_eq!(joined.channels(), 1);
        assert_eq!(joined.frames(), 150);
    }

    #[test]
    fn transforms_do_not_mutate_the_source() {
        let buf = ramp(100, 8000);
        let copy = buf.clone();
        let _ = buf.resample(16000).unwrap();
        let _ = buf.normalize();
        let _ = buf.append_silence(10).unwrap();
        assert_eq!(buf, copy);
    }
}
