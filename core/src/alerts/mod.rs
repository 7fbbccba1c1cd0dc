// Alert ingestion: model, upstream client, filtering, test injection

pub mod client;
pub mod model;

pub use client::{AlertClient, AlertClientConfig, InjectSpec};
pub use model::{
    Category, Certainty, Severity, Status, TimeBasis, Urgency, WeatherAlert,
};
