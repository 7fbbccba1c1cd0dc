//! DTMF command dispatch.
//!
//! Each code is handled independently; there is no session state between
//! invocations. Every path returns a `DtmfResponse`. This dispatcher is
//! driven by line-triggered events with a live-audio consumer and no
//! upstream error channel, so nothing here may propagate an error.

use crate::alerts::WeatherAlert;
use crate::describe::{DescriptionAudio, DescriptionCache};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CurrentAlerts,
    AlertById,
    AllClear,
    SystemStatus,
    Help,
}

impl Command {
    /// Spoken label used by the help narration.
    pub fn spoken(&self) -> &'static str {
        match self {
            Command::CurrentAlerts => "a summary of current alerts",
            Command::AlertById => "a detailed alert description, followed by the alert number",
            Command::AllClear => "the all clear announcement",
            Command::SystemStatus => "system status",
            Command::Help => "this help message",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfConfig {
    /// Code -> command table. BTreeMap keeps help narration order stable.
    pub codes: BTreeMap<String, Command>,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        let mut codes = BTreeMap::new();
        codes.insert("*1".to_string(), Command::CurrentAlerts);
        codes.insert("*2".to_string(), Command::AlertById);
        codes.insert("*3".to_string(), Command::AllClear);
        codes.insert("*4".to_string(), Command::SystemStatus);
        codes.insert("*5".to_string(), Command::Help);
        Self { codes }
    }
}

/// Runtime state reported over the air by the status command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub active_alerts: usize,
    pub uptime_seconds: u64,
}

/// Outcome of one dispatched code. `code` echoes the dialed code so callers
/// with several in-flight requests can correlate responses; `audio`, when
/// present, is ready for playback on the repeater.
#[derive(Debug, Clone)]
pub struct DtmfResponse {
    pub code: String,
    pub success: bool,
    pub command: Option<Command>,
    pub message: String,
    pub audio: Option<DescriptionAudio>,
}

impl DtmfResponse {
    fn ok(command: Command, message: impl Into<String>, audio: DescriptionAudio) -> Self {
        Self {
            code: String::new(),
            success: true,
            command: Some(command),
            message: message.into(),
            audio: Some(audio),
        }
    }

    fn failed(command: Option<Command>, message: impl Into<String>) -> Self {
        Self {
            code: String::new(),
            success: false,
            command,
            message: message.into(),
            audio: None,
        }
    }
}

pub trait AlertsProvider: Send + Sync {
    fn current_alerts(&self) -> Vec<WeatherAlert>;
}

pub trait StatusProvider: Send + Sync {
    fn status(&self) -> StatusSnapshot;
}

pub trait AlertLookup: Send + Sync {
    /// Resolve trailing DTMF digits to an alert, by position or id.
    fn lookup(&self, digits: &str) -> Option<WeatherAlert>;
}

pub struct DtmfDispatcher {
    cfg: DtmfConfig,
    cache: Arc<DescriptionCache>,
    alerts: Option<Arc<dyn AlertsProvider>>,
    status: Option<Arc<dyn StatusProvider>>,
    lookup: Option<Arc<dyn AlertLookup>>,
}

impl DtmfDispatcher {
    pub fn new(cache: Arc<DescriptionCache>, cfg: DtmfConfig) -> Self {
        Self {
            cfg,
            cache,
            alerts: None,
            status: None,
            lookup: None,
        }
    }

    pub fn with_alerts(mut self, provider: Arc<dyn AlertsProvider>) -> Self {
        self.alerts = Some(provider);
        self
    }

    pub fn with_status(mut self, provider: Arc<dyn StatusProvider>) -> Self {
        self.status = Some(provider);
        self
    }

    pub fn with_lookup(mut self, provider: Arc<dyn AlertLookup>) -> Self {
        self.lookup = Some(provider);
        self
    }

    fn valid_codes(&self) -> String {
        self.cfg
            .codes
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Dispatch a raw input line, splitting trailing digits from the code.
    pub async fn dispatch_input(&self, input: &str) -> DtmfResponse {
        let mut parts = input.split_whitespace();
        let code = parts.next().unwrap_or("");
        let extra = parts.next();
        self.dispatch(code, extra).await
    }

    /// Dispatch one code with optional trailing digits.
    pub async fn dispatch(&self, code: &str, extra: Option<&str>) -> DtmfResponse {
        let mut response = self.dispatch_matched(code, extra).await;
        response.code = code.to_string();
        response
    }

    async fn dispatch_matched(&self, code: &str, extra: Option<&str>) -> DtmfResponse {
        let command = match self.cfg.codes.get(code) {
            Some(c) => *c,
            None => {
                warn!(target: "dtmf", code = %code, "Unmatched DTMF code");
                return DtmfResponse::failed(
                    None,
                    format!("Unknown code {}. Valid codes: {}", code, self.valid_codes()),
                );
            }
        };
        info!(target: "dtmf", code = %code, command = ?command, "Dispatching DTMF command");

        let response = match command {
            Command::CurrentAlerts => self.handle_current_alerts().await,
            Command::AlertById => self.handle_alert_by_id(extra).await,
            Command::AllClear => self.handle_all_clear().await,
            Command::SystemStatus => self.handle_system_status().await,
            Command::Help => self.handle_help().await,
        };
        if !response.success {
            warn!(target: "dtmf", command = ?command, message = %response.message, "DTMF command failed");
        }
        response
    }

    async fn handle_current_alerts(&self) -> DtmfResponse {
        let provider = match &self.alerts {
            Some(p) => p,
            None => {
                return DtmfResponse::failed(
                    Some(Command::CurrentAlerts),
                    "Current alerts callback not set",
                )
            }
        };
        let alerts = provider.current_alerts();
        match self.cache.current_alerts(&alerts).await {
            Ok(audio) => DtmfResponse::ok(
                Command::CurrentAlerts,
                format!("{} active alerts", alerts.len()),
                audio,
            ),
            Err(e) => DtmfResponse::failed(
                Some(Command::CurrentAlerts),
                format!("Failed to narrate current alerts: {}", e),
            ),
        }
    }

    async fn handle_alert_by_id(&self, extra: Option<&str>) -> DtmfResponse {
        let digits = match extra.filter(|d| !d.is_empty()) {
            Some(d) => d,
            None => return DtmfResponse::failed(Some(Command::AlertById), "Alert ID required"),
        };
        let provider = match &self.lookup {
            Some(p) => p,
            None => {
                return DtmfResponse::failed(
                    Some(Command::AlertById),
                    "Alert lookup callback not set",
                )
            }
        };
        let alert = match provider.lookup(digits) {
            Some(a) => a,
            None => {
                return DtmfResponse::failed(
                    Some(Command::AlertById),
                    format!("Alert not found: {}", digits),
                )
            }
        };
        match self.cache.describe_alert(&alert).await {
            Ok(audio) => DtmfResponse::ok(Command::AlertById, alert.event.clone(), audio),
            Err(e) => DtmfResponse::failed(
                Some(Command::AlertById),
                format!("Failed to narrate alert {}: {}", alert.id, e),
            ),
        }
    }

    async fn handle_all_clear(&self) -> DtmfResponse {
        match self.cache.all_clear().await {
            Ok(audio) => DtmfResponse::ok(Command::AllClear, "All clear", audio),
            Err(e) => DtmfResponse::failed(
                Some(Command::AllClear),
                format!("Failed to narrate all clear: {}", e),
            ),
        }
    }

    async fn handle_system_status(&self) -> DtmfResponse {
        let provider = match &self.status {
            Some(p) => p,
            None => {
                return DtmfResponse::failed(
                    Some(Command::SystemStatus),
                    "System status callback not set",
                )
            }
        };
        let snapshot = provider.status();
        match self.cache.system_status(&snapshot).await {
            Ok(audio) => DtmfResponse::ok(
                Command::SystemStatus,
                format!("{} active alerts", snapshot.active_alerts),
                audio,
            ),
            Err(e) => DtmfResponse::failed(
                Some(Command::SystemStatus),
                format!("Failed to narrate system status: {}", e),
            ),
        }
    }

    async fn handle_help(&self) -> DtmfResponse {
        // Narrate the live table so a reconfigured code map stays accurate
        let mut parts = vec!["Skywarn commands".to_string()];
        for (code, command) in &self.cfg.codes {
            let spoken_code: String = code
                .chars()
                .map(|c| if c == '*' { "star ".to_string() } else { format!("{} ", c) })
                .collect();
            parts.push(format!("Press {}for {}", spoken_code, command.spoken()));
        }
        let text = format!("{}.", parts.join(". "));
        match self.cache.speak_cached("help", &text).await {
            Ok(audio) => DtmfResponse::ok(Command::Help, "Help", audio),
            Err(e) => DtmfResponse::failed(
                Some(Command::Help),
                format!("Failed to narrate help: {}", e),
            ),
        }
    }
}
