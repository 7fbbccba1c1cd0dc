// Skywarn Core Library
// Severe-weather alert ingest, spoken narration, and DTMF-driven playback

pub mod alerts;
pub mod describe;
pub mod dtmf;
pub mod playback;
pub mod telemetry;

// Export core types
pub use alerts::{AlertClient, AlertClientConfig, InjectSpec, TimeBasis, WeatherAlert};
pub use describe::{DescribeConfig, DescriptionAudio, DescriptionCache, Selection};
pub use dtmf::{
    AlertLookup, AlertsProvider, Command, DtmfConfig, DtmfDispatcher, DtmfResponse,
    StatusProvider, StatusSnapshot,
};
pub use playback::{AsteriskBridge, AsteriskConfig, NodeResult, PlaybackMode};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkywarnError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("audio error: {0}")]
    Audio(#[from] skywarn_audio::AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SkywarnError>;
