//! Narration assembly and speech-text normalization.
//!
//! Upstream alert prose is written for screens: asterisk bullets, ellipsis
//! separators, compass letters, "130PM" times. Everything here rewrites that
//! into text a TTS engine can speak cleanly.

use crate::alerts::WeatherAlert;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

pub const DEFAULT_MAX_WORDS: usize = 150;

/// Word-boundary abbreviation expansions. Matching is exact-case; lowercase
/// prose words ("in", "no") must never collide with unit shorthand.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("mph", "miles per hour"),
    ("MPH", "miles per hour"),
    ("kph", "kilometers per hour"),
    ("knots", "nautical miles per hour"),
    ("kts", "nautical miles per hour"),
    ("kt", "nautical miles per hour"),
    ("ft", "feet"),
    ("NNE", "north northeast"),
    ("ENE", "east northeast"),
    ("ESE", "east southeast"),
    ("SSE", "south southeast"),
    ("SSW", "south southwest"),
    ("WSW", "west southwest"),
    ("WNW", "west northwest"),
    ("NNW", "north northwest"),
    ("NE", "northeast"),
    ("NW", "northwest"),
    ("SE", "southeast"),
    ("SW", "southwest"),
    ("N", "north"),
    ("S", "south"),
    ("E", "east"),
    ("W", "west"),
    ("CDT", "Central Daylight Time"),
    ("CST", "Central Standard Time"),
    ("EDT", "Eastern Daylight Time"),
    ("EST", "Eastern Standard Time"),
    ("MDT", "Mountain Daylight Time"),
    ("MST", "Mountain Standard Time"),
    ("PDT", "Pacific Daylight Time"),
    ("PST", "Pacific Standard Time"),
];

static ELLIPSIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());
static DIGIT_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)([A-Za-z])").unwrap());
static BARE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})([0-5][0-9])\s?([APap][Mm])\b").unwrap());
static AMPM_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}(?::[0-5][0-9])?)\s+([APap][Mm])\b").unwrap());
static EXPANSIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    ABBREVIATIONS
        .iter()
        .map(|(abbr, full)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(abbr))).unwrap();
            (re, *full)
        })
        .collect()
});

/// Normalize free text for synthesis and cap it to `max_words`.
pub fn normalize_for_speech(text: &str, max_words: usize) -> String {
    // Bullets and ellipsis separators first
    let text = text.replace('*', " ");
    let text = ELLIPSIS.replace_all(&text, ". ");

    // "50mph" -> "50 mph"; a later pass rejoins am/pm
    let text = DIGIT_LETTER.replace_all(&text, "${1} ${2}");
    // "130 PM" -> "1:30PM"
    let text = BARE_TIME.replace_all(&text, "${1}:${2}${3}");
    // "2 PM" -> "2PM"
    let text = AMPM_SPACE.replace_all(&text, "${1}${2}");

    let mut text = text.into_owned();
    for (re, full) in EXPANSIONS.iter() {
        text = re.replace_all(&text, *full).into_owned();
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max_words {
        warn!(
            target: "describe",
            words = words.len(),
            max_words,
            "Truncating narration to word cap"
        );
        words[..max_words].join(" ")
    } else {
        words.join(" ")
    }
}

fn spoken_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%B %d, %Y at %I:%M %p").to_string()
}

/// Long-form narration for one alert, one clause per attribute.
pub fn alert_narration(alert: &WeatherAlert) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("Weather alert: {}", alert.event));
    parts.push(format!("Affected area: {}", alert.area_desc));
    if let Some(headline) = &alert.headline {
        parts.push(format!("Headline: {}", headline));
    }
    if !alert.description.is_empty() {
        parts.push(format!("Description: {}", alert.description));
    }
    if let Some(instruction) = &alert.instruction {
        parts.push(format!("Instructions: {}", instruction));
    }
    parts.push(format!("Effective: {}", spoken_timestamp(&alert.effective)));
    parts.push(format!("Expires: {}", spoken_timestamp(&alert.expires)));
    parts.push(format!("Severity: {}", alert.severity.as_str()));
    parts.push(format!("Urgency: {}", alert.urgency.as_str()));
    parts.push(format!("Certainty: {}", alert.certainty.as_str()));
    format!("{}.", parts.join(". "))
}

/// Summary narration for the full active set.
pub fn current_alerts_narration(alerts: &[WeatherAlert]) -> String {
    if alerts.is_empty() {
        return "There are currently no active weather alerts in your area.".to_string();
    }
    let mut parts = vec![format!(
        "There are currently {} active weather alerts:",
        alerts.len()
    )];
    for (i, alert) in alerts.iter().enumerate() {
        parts.push(format!(
            "Alert {}: {} for {}",
            i + 1,
            alert.event,
            alert.area_desc
        ));
        if !alert.description.is_empty() {
            let detail: String = if alert.description.len() > 200 {
                let mut end = 200;
                while !alert.description.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &alert.description[..end])
            } else {
                alert.description.clone()
            };
            parts.push(format!("Details: {}", detail));
        }
    }
    format!("{}.", parts.join(". "))
}

pub fn all_clear_narration() -> String {
    "All weather alerts have been cleared. There are no active weather warnings \
     or watches in your area at this time."
        .to_string()
}

fn spoken_uptime(uptime_seconds: u64) -> String {
    let hours = uptime_seconds / 3600;
    let minutes = (uptime_seconds % 3600) / 60;
    if hours > 0 {
        format!("{} hours and {} minutes", hours, minutes)
    } else {
        format!("{} minutes", minutes)
    }
}

pub fn system_status_narration(status: &crate::dtmf::StatusSnapshot) -> String {
    let mut parts = vec!["Skywarn system status".to_string()];
    if status.running {
        parts.push("System is running normally".to_string());
        parts.push(format!("Active alerts: {}", status.active_alerts));
        parts.push(format!("Uptime: {}", spoken_uptime(status.uptime_seconds)));
    } else {
        parts.push("System is not running".to_string());
    }
    format!("{}.", parts.join(". "))
}

/// How a listener selects one alert from the active set.
#[derive(Debug, Clone)]
pub enum Selection {
    /// 1-based position in the ordered group list.
    Index(usize),
    /// Exact alert title.
    Title(String),
}

/// Resolve a selection against ordered "title -> occurrences" groups into a
/// narration. Misses produce a *spoken* error narration, never an error:
/// this path ends in audio on a live repeater and must not go silent.
pub fn describe_selection(
    selection: &Selection,
    groups: &[(String, Vec<WeatherAlert>)],
) -> String {
    let found = match selection {
        Selection::Index(i) => {
            if *i == 0 || *i > groups.len() {
                None
            } else {
                groups.get(i - 1)
            }
        }
        Selection::Title(title) => groups.iter().find(|(t, _)| t == title),
    };

    match found {
        Some((title, occurrences)) => match occurrences.first() {
            Some(first) => {
                let body = alert_narration(first);
                if occurrences.len() > 1 {
                    format!(
                        "There are {} unique {} alerts. Describing the first instance. {}",
                        occurrences.len(),
                        title,
                        body
                    )
                } else {
                    body
                }
            }
            None => format!("No instances of {} are currently stored.", title),
        },
        None => {
            let what = match selection {
                Selection::Index(i) => format!("Alert number {}", i),
                Selection::Title(t) => format!("Alert {}", t),
            };
            format!(
                "{} was not found. There are {} alerts available.",
                what,
                groups.len()
            )
        }
    }
}
