//! Weather alert value types and upstream record parsing.
//!
//! A `WeatherAlert` is immutable after parsing; a newer alert sharing the
//! same id supersedes it at the consumer, never in here.

use crate::{Result, SkywarnError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Severity {
    Extreme,
    Severe,
    Moderate,
    Minor,
    #[default]
    Unknown,
}

impl Severity {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Extreme" => Severity::Extreme,
            "Severe" => Severity::Severe,
            "Moderate" => Severity::Moderate,
            "Minor" => Severity::Minor,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Extreme => "Extreme",
            Severity::Severe => "Severe",
            Severity::Moderate => "Moderate",
            Severity::Minor => "Minor",
            Severity::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Urgency {
    Immediate,
    Expected,
    Future,
    Past,
    #[default]
    Unknown,
}

impl Urgency {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Immediate" => Urgency::Immediate,
            "Expected" => Urgency::Expected,
            "Future" => Urgency::Future,
            "Past" => Urgency::Past,
            _ => Urgency::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediate => "Immediate",
            Urgency::Expected => "Expected",
            Urgency::Future => "Future",
            Urgency::Past => "Past",
            Urgency::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Certainty {
    Observed,
    Likely,
    Possible,
    Unlikely,
    #[default]
    Unknown,
}

impl Certainty {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Observed" => Certainty::Observed,
            "Likely" => Certainty::Likely,
            "Possible" => Certainty::Possible,
            "Unlikely" => Certainty::Unlikely,
            _ => Certainty::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Certainty::Observed => "Observed",
            Certainty::Likely => "Likely",
            Certainty::Possible => "Possible",
            Certainty::Unlikely => "Unlikely",
            Certainty::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    Actual,
    Exercise,
    System,
    Test,
    Draft,
}

impl Status {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Exercise" => Status::Exercise,
            "System" => Status::System,
            "Test" => Status::Test,
            "Draft" => Status::Draft,
            _ => Status::Actual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Met,
    Geo,
    Safety,
    Security,
    Rescue,
    Fire,
    Health,
    Env,
    Transport,
    Infra,
    Cbrne,
    #[default]
    Other,
}

impl Category {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Met" => Category::Met,
            "Geo" => Category::Geo,
            "Safety" => Category::Safety,
            "Security" => Category::Security,
            "Rescue" => Category::Rescue,
            "Fire" => Category::Fire,
            "Health" => Category::Health,
            "Env" => Category::Env,
            "Transport" => Category::Transport,
            "Infra" => Category::Infra,
            "CBRNE" => Category::Cbrne,
            _ => Category::Other,
        }
    }
}

/// Which timestamps define an alert's active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeBasis {
    /// `onset <= now < (ends or expires)`; start falls back to `effective`
    /// when onset is absent.
    #[default]
    Onset,
    /// `effective <= now < expires`.
    Effective,
}

/// One upstream alert, immutable after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub id: String,
    pub event: String,
    pub headline: Option<String>,
    pub description: String,
    pub instruction: Option<String>,
    pub severity: Severity,
    pub urgency: Urgency,
    pub certainty: Certainty,
    pub status: Status,
    pub category: Category,
    pub sent: DateTime<Utc>,
    pub effective: DateTime<Utc>,
    pub onset: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
    pub ends: Option<DateTime<Utc>>,
    pub area_desc: String,
    /// SAME transmitter codes.
    pub geocode: Vec<String>,
    /// UGC county/zone codes.
    pub county_codes: Vec<String>,
    pub sender: String,
    pub sender_name: String,
}

/// GeoJSON-like feature collection returned by the alert source.
#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
pub struct Feature {
    pub properties: RawProperties,
}

/// The raw `properties` bag of one feature; everything is optional here so a
/// single malformed record can be rejected without failing the batch.
#[derive(Debug, Default, Deserialize)]
pub struct RawProperties {
    pub id: Option<String>,
    pub event: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub sent: Option<String>,
    pub effective: Option<String>,
    pub onset: Option<String>,
    pub expires: Option<String>,
    pub ends: Option<String>,
    #[serde(rename = "areaDesc")]
    pub area_desc: Option<String>,
    #[serde(default)]
    pub geocode: RawGeocode,
    pub sender: Option<String>,
    #[serde(rename = "senderName")]
    pub sender_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawGeocode {
    #[serde(rename = "SAME", default)]
    pub same: Vec<String>,
    #[serde(rename = "UGC", default)]
    pub ugc: Vec<String>,
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| SkywarnError::Parse(format!("missing required field: {}", field)))
}

fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SkywarnError::Parse(format!("bad {} timestamp {:?}: {}", field, value, e)))
}

impl WeatherAlert {
    /// Parse one feature's properties. A record missing any of
    /// {id, event, sent, effective, expires} is a parse error; callers skip
    /// and log rather than failing the batch.
    pub fn from_properties(props: RawProperties) -> Result<Self> {
        let id = require(props.id, "id")?;
        let event = require(props.event, "event")?;
        let sent = parse_ts(&require(props.sent, "sent")?, "sent")?;
        let effective = parse_ts(&require(props.effective, "effective")?, "effective")?;
        let expires = parse_ts(&require(props.expires, "expires")?, "expires")?;
        let onset = props.onset.as_deref().map(|v| parse_ts(v, "onset")).transpose()?;
        let ends = props.ends.as_deref().map(|v| parse_ts(v, "ends")).transpose()?;

        if sent > effective {
            return Err(SkywarnError::Parse(format!(
                "alert {} sent after effective ({} > {})",
                id, sent, effective
            )));
        }

        Ok(WeatherAlert {
            id,
            event,
            headline: props.headline,
            description: props.description.unwrap_or_default(),
            instruction: props.instruction,
            severity: props
                .severity
                .as_deref()
                .map(Severity::from_label)
                .unwrap_or_default(),
            urgency: props
                .urgency
                .as_deref()
                .map(Urgency::from_label)
                .unwrap_or_default(),
            certainty: props
                .certainty
                .as_deref()
                .map(Certainty::from_label)
                .unwrap_or_default(),
            status: props
                .status
                .as_deref()
                .map(Status::from_label)
                .unwrap_or_default(),
            category: props
                .category
                .as_deref()
                .map(Category::from_label)
                .unwrap_or_default(),
            sent,
            effective,
            onset,
            expires,
            ends,
            area_desc: props.area_desc.unwrap_or_default(),
            geocode: props.geocode.same,
            county_codes: props.geocode.ugc,
            sender: props.sender.unwrap_or_default(),
            sender_name: props.sender_name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(json: serde_json::Value) -> RawProperties {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parses_a_complete_record() {
        let alert = WeatherAlert::from_properties(props(serde_json::json!({
            "id": "urn:oid:2.49.0.1.840.0.abc",
            "event": "Tornado Warning",
            "headline": "Tornado Warning until 3 PM",
            "description": "A tornado was spotted.",
            "severity": "Extreme",
            "urgency": "Immediate",
            "certainty": "Observed",
            "status": "Actual",
            "category": "Met",
            "sent": "2026-08-28T12:00:00-05:00",
            "effective": "2026-08-28T12:00:00-05:00",
            "onset": "2026-08-28T12:10:00-05:00",
            "expires": "2026-08-28T15:00:00-05:00",
            "areaDesc": "Brazoria County",
            "geocode": {"SAME": ["048039"], "UGC": ["TXC039"]},
            "sender": "w-nws.webmaster@noaa.gov",
            "senderName": "NWS Houston"
        })))
        .unwrap();

        assert_eq!(alert.severity, Severity::Extreme);
        assert_eq!(alert.county_codes, vec!["TXC039"]);
        assert!(alert.onset.is_some());
        assert!(alert.ends.is_none());
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let err = WeatherAlert::from_properties(props(serde_json::json!({
            "id": "x",
            "event": "Flood Watch",
            "sent": "2026-08-28T12:00:00Z",
            "effective": "2026-08-28T12:00:00Z"
            // expires missing
        })))
        .unwrap_err();
        assert!(matches!(err, SkywarnError::Parse(_)));
    }

    #[test]
    fn sent_after_effective_is_rejected() {
        let err = WeatherAlert::from_properties(props(serde_json::json!({
            "id": "x",
            "event": "Flood Watch",
            "sent": "2026-08-28T13:00:00Z",
            "effective": "2026-08-28T12:00:00Z",
            "expires": "2026-08-28T18:00:00Z"
        })))
        .unwrap_err();
        assert!(matches!(err, SkywarnError::Parse(_)));
    }

    #[test]
    fn unknown_labels_map_to_defaults() {
        assert_eq!(Severity::from_label("Apocalyptic"), Severity::Unknown);
        assert_eq!(Status::from_label("Bogus"), Status::Actual);
        assert_eq!(Category::from_label("Bogus"), Category::Other);
    }
}
