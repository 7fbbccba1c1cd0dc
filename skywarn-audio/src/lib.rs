// Skywarn audio library
// PCM buffers, format export, and speech synthesis for repeater announcements

pub mod buffer;
pub mod encode;
pub mod synth;
pub mod tts;
pub mod util;
pub mod wav;

pub use buffer::AudioBuffer;
pub use encode::ExportFormat;
pub use synth::{SpeechSynthesizer, SynthesizerConfig};
pub use tts::{EngineKind, EspeakEngine, PiperEngine, TtsConfig, TtsEngine};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("invalid audio buffer: {0}")]
    InvalidBuffer(String),

    #[error("resampling {frames} frames from {from} Hz to {to} Hz yields no samples")]
    ResampleUnderflow { frames: usize, from: u32, to: u32 },

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("encoder binary not found: {0}")]
    EncoderMissing(String),

    #[error("encoder failed on {path}: {stderr}")]
    EncoderFailed { path: PathBuf, stderr: String },

    #[error("encoder produced empty output: {0}")]
    EmptyOutput(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;
