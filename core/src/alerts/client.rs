//! Upstream alert client: concurrent zone fetch, bounded retry/backoff,
//! deduplication, active-window filtering, and synthetic test injection.

use crate::alerts::model::{
    Feature, FeatureCollection, Severity, Status, TimeBasis, WeatherAlert,
};
use crate::{Result, SkywarnError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Configuration for the alert source client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertClientConfig {
    /// API base URL.
    pub base_url: String,
    /// Timeout for API requests in milliseconds.
    pub timeout_ms: u64,
    /// User agent string; the upstream service requires one.
    pub user_agent: String,
    /// Retry budget for 5xx/transport failures.
    pub max_retries: u32,
}

impl Default for AlertClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weather.gov".to_string(),
            timeout_ms: 10_000,
            user_agent: "skywarn/0.1".to_string(),
            max_retries: 3,
        }
    }
}

/// Descriptor for one synthetic test alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectSpec {
    pub title: String,
    /// Zones to fan the alert out to; empty means rank-based assignment
    /// from the configured zone list.
    #[serde(default)]
    pub zones: Vec<String>,
    /// When the synthetic alert ends; defaults to one hour out.
    #[serde(default)]
    pub ends: Option<DateTime<Utc>>,
}

/// Client for the polling REST alert source.
#[derive(Clone)]
pub struct AlertClient {
    cfg: AlertClientConfig,
    http: reqwest::Client,
}

impl AlertClient {
    pub fn new(cfg: AlertClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(&cfg.user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { cfg, http }
    }

    /// Fetch the active-alert collection at `url`, retrying 5xx and
    /// transport failures with `2^attempt` seconds of backoff. 4xx is
    /// surfaced immediately; the request was wrong and will stay wrong.
    async fn fetch_collection(&self, url: &str) -> Result<FeatureCollection> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.http.get(url).send().await;
            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<FeatureCollection>().await.map_err(|e| {
                            SkywarnError::Parse(format!("bad alert payload: {}", e))
                        });
                    }
                    if status.is_client_error() {
                        warn!(target: "alerts", status = %status, url, "Alert request rejected");
                        return Err(SkywarnError::Client(format!(
                            "alert source returned {}",
                            status
                        )));
                    }
                    if attempt >= self.cfg.max_retries {
                        return Err(SkywarnError::Transport(format!(
                            "alert source returned {} after {} retries",
                            status, attempt
                        )));
                    }
                    warn!(
                        target: "alerts",
                        status = %status,
                        attempt = attempt + 1,
                        max = self.cfg.max_retries,
                        "Server error, retrying"
                    );
                }
                Err(e) => {
                    if attempt >= self.cfg.max_retries {
                        return Err(SkywarnError::Transport(format!(
                            "request failed after {} retries: {}",
                            attempt, e
                        )));
                    }
                    warn!(
                        target: "alerts",
                        error = %e,
                        attempt = attempt + 1,
                        max = self.cfg.max_retries,
                        "Request error, retrying"
                    );
                }
            }
            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            attempt += 1;
        }
    }

    fn parse_features(features: Vec<Feature>) -> Vec<WeatherAlert> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut alerts = Vec::new();
        for feature in features {
            match WeatherAlert::from_properties(feature.properties) {
                Ok(alert) => {
                    if seen.insert(alert.id.clone()) {
                        alerts.push(alert);
                    }
                }
                Err(e) => {
                    debug!(target: "alerts", error = %e, "Skipping malformed alert record");
                }
            }
        }
        alerts
    }

    /// Fetch active alerts for a single zone/county code.
    pub async fn fetch_zone(&self, zone: &str) -> Result<Vec<WeatherAlert>> {
        let url = format!("{}/alerts/active?zone={}", self.cfg.base_url, zone);
        debug!(target: "alerts", zone, "Fetching alerts");
        let collection = self.fetch_collection(&url).await?;
        let alerts = Self::parse_features(collection.features);
        debug!(target: "alerts", zone, count = alerts.len(), "Retrieved alerts");
        Ok(alerts)
    }

    /// Fetch all active alerts regardless of zone. Large response; mainly
    /// for diagnostics.
    pub async fn fetch_all(&self) -> Result<Vec<WeatherAlert>> {
        let url = format!("{}/alerts/active", self.cfg.base_url);
        warn!(target: "alerts", "Fetching ALL active alerts, this may be a large dataset");
        let collection = self.fetch_collection(&url).await?;
        Ok(Self::parse_features(collection.features))
    }

    /// Fetch alerts for many zones concurrently. A failed zone is logged
    /// and skipped; the union of successful zones is returned, deduplicated
    /// by alert id (first seen wins).
    pub async fn fetch_zones(&self, zones: &[String]) -> Vec<WeatherAlert> {
        debug!(target: "alerts", zones = zones.len(), "Fetching alerts for zones");
        let mut set = JoinSet::new();
        for zone in zones {
            let client = self.clone();
            let zone = zone.clone();
            set.spawn(async move {
                let res = client.fetch_zone(&zone).await;
                (zone, res)
            });
        }

        let mut all = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(alerts))) => all.extend(alerts),
                Ok((zone, Err(e))) => {
                    warn!(target: "alerts", zone = %zone, error = %e, "Zone fetch failed");
                }
                Err(e) => {
                    warn!(target: "alerts", error = %e, "Zone fetch task panicked");
                }
            }
        }

        let deduped = dedup_alerts(all);
        info!(
            target: "alerts",
            count = deduped.len(),
            zones = zones.len(),
            "Retrieved alerts"
        );
        deduped
    }

    /// Probe the alert source.
    pub async fn test_connection(&self) -> bool {
        let url = format!("{}/alerts/active", self.cfg.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(target: "alerts", "Alert source connection test successful");
                true
            }
            Ok(resp) => {
                warn!(target: "alerts", status = %resp.status(), "Alert source connection test failed");
                false
            }
            Err(e) => {
                warn!(target: "alerts", error = %e, "Alert source connection test failed");
                false
            }
        }
    }
}

/// Keep exactly one alert per id, first seen wins.
pub fn dedup_alerts(alerts: Vec<WeatherAlert>) -> Vec<WeatherAlert> {
    let mut seen: HashSet<String> = HashSet::new();
    alerts
        .into_iter()
        .filter(|a| seen.insert(a.id.clone()))
        .collect()
}

/// Filter to alerts active now. Pure, no I/O.
pub fn filter_active(alerts: &[WeatherAlert], basis: TimeBasis) -> Vec<WeatherAlert> {
    filter_active_at(alerts, basis, Utc::now())
}

/// Active-window check against an explicit clock.
///
/// Onset basis: start is `onset`, falling back to `effective` when absent;
/// end is `ends`, falling back to `expires`. Effective basis: start is
/// `effective`, end is `expires`. One rule, applied uniformly.
pub fn filter_active_at(
    alerts: &[WeatherAlert],
    basis: TimeBasis,
    now: DateTime<Utc>,
) -> Vec<WeatherAlert> {
    alerts
        .iter()
        .filter(|alert| {
            let (start, end) = match basis {
                TimeBasis::Onset => (
                    alert.onset.unwrap_or(alert.effective),
                    alert.ends.unwrap_or(alert.expires),
                ),
                TimeBasis::Effective => (alert.effective, alert.expires),
            };
            let active = start <= now && now < end;
            if !active {
                debug!(
                    target: "alerts",
                    event = %alert.event,
                    start = %start,
                    end = %end,
                    "Alert not active"
                );
            }
            active
        })
        .cloned()
        .collect()
}

/// Severity implied by the last word of a synthetic alert title.
fn severity_from_title(title: &str) -> Severity {
    match title.split_whitespace().last().unwrap_or("") {
        "Warning" => Severity::Severe,
        "Watch" => Severity::Moderate,
        "Advisory" | "Statement" => Severity::Minor,
        _ => Severity::Unknown,
    }
}

fn slug(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Build synthetic alerts for operational testing.
///
/// An entry with no zones at position `i` is fanned out to the first `i + 1`
/// configured zones, so successive entries exercise progressively wider
/// coverage. One alert instance is generated per assigned zone.
pub fn generate_injected(specs: &[InjectSpec], available_zones: &[String]) -> Vec<WeatherAlert> {
    let now = Utc::now();
    let mut alerts = Vec::new();

    for (rank, spec) in specs.iter().enumerate() {
        let zones: Vec<String> = if spec.zones.is_empty() {
            available_zones
                .iter()
                .take(rank + 1)
                .cloned()
                .collect()
        } else {
            spec.zones.clone()
        };
        if zones.is_empty() {
            warn!(target: "alerts", title = %spec.title, "No zones available for injected alert");
            continue;
        }

        let ends = spec.ends.unwrap_or(now + ChronoDuration::hours(1));
        let severity = severity_from_title(&spec.title);

        for zone in zones {
            let id = format!(
                "inject-{}-{}-{}",
                slug(&spec.title),
                zone,
                now.timestamp_millis()
            );
            alerts.push(WeatherAlert {
                id,
                event: spec.title.clone(),
                headline: Some(format!("{} for {}", spec.title, zone)),
                description: format!("Injected test alert: {}", spec.title),
                instruction: None,
                severity,
                urgency: Default::default(),
                certainty: Default::default(),
                status: Status::Test,
                category: Default::default(),
                sent: now,
                effective: now,
                onset: Some(now),
                expires: ends,
                ends: Some(ends),
                area_desc: zone.clone(),
                geocode: Vec::new(),
                county_codes: vec![zone],
                sender: "skywarn-inject".to_string(),
                sender_name: "Skywarn Test Injection".to_string(),
            });
        }
        info!(target: "alerts", title = %spec.title, "Generated injected alert");
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn alert(id: &str, effective_off_min: i64, expires_off_min: i64) -> WeatherAlert {
        let now = Utc::now();
        WeatherAlert {
            id: id.to_string(),
            event: "Flood Watch".to_string(),
            headline: None,
            description: String::new(),
            instruction: None,
            severity: Default::default(),
            urgency: Default::default(),
            certainty: Default::default(),
            status: Default::default(),
            category: Default::default(),
            sent: now + ChronoDuration::minutes(effective_off_min),
            effective: now + ChronoDuration::minutes(effective_off_min),
            onset: None,
            expires: now + ChronoDuration::minutes(expires_off_min),
            ends: None,
            area_desc: String::new(),
            geocode: Vec::new(),
            county_codes: Vec::new(),
            sender: String::new(),
            sender_name: String::new(),
        }
    }

    #[test]
    fn dedup_keeps_one_instance_per_id() {
        let alerts = vec![
            alert("a", -10, 10),
            alert("b", -10, 10),
            alert("a", -5, 20),
            alert("b", -1, 1),
            alert("c", -10, 10),
        ];
        let deduped = dedup_alerts(alerts);
        assert_eq!(deduped.len(), 3);
        let ids: HashSet<_> = deduped.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["a", "b", "c"]));
    }

    #[test]
    fn effective_basis_window() {
        let active = alert("active", -60, 60);
        let expired = alert("expired", -120, -1);
        let out = filter_active(&[active, expired], TimeBasis::Effective);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "active");
    }

    #[test]
    fn onset_basis_falls_back_to_effective() {
        let mut no_onset = alert("no-onset", -30, 30);
        no_onset.onset = None;
        let mut future_onset = alert("future-onset", -30, 30);
        future_onset.onset = Some(Utc::now() + ChronoDuration::minutes(10));

        let out = filter_active(&[no_onset, future_onset], TimeBasis::Onset);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "no-onset");
    }

    #[test]
    fn onset_basis_prefers_ends_over_expires() {
        let mut ended = alert("ended", -60, 60);
        ended.onset = Some(Utc::now() - ChronoDuration::minutes(50));
        ended.ends = Some(Utc::now() - ChronoDuration::minutes(5));
        let out = filter_active(&[ended], TimeBasis::Onset);
        assert!(out.is_empty());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let mut edge = alert("edge", -60, 0);
        edge.expires = now;
        let out = filter_active_at(&[edge], TimeBasis::Effective, now);
        assert!(out.is_empty());
    }

    #[test]
    fn injected_severity_follows_title() {
        assert_eq!(severity_from_title("Tornado Warning"), Severity::Severe);
        assert_eq!(severity_from_title("Flood Watch"), Severity::Moderate);
        assert_eq!(severity_from_title("Wind Advisory"), Severity::Minor);
        assert_eq!(severity_from_title("Special Weather Statement"), Severity::Minor);
        assert_eq!(severity_from_title("Something Odd"), Severity::Unknown);
    }

    #[test]
    fn injected_rank_based_fanout() {
        let zones: Vec<String> = ["TXC039", "TXC071", "TXC157"]
            .iter()
            .map(|z| z.to_string())
            .collect();
        let specs = vec![
            InjectSpec {
                title: "Tornado Warning".to_string(),
                zones: vec![],
                ends: None,
            },
            InjectSpec {
                title: "Flood Watch".to_string(),
                zones: vec![],
                ends: None,
            },
        ];
        let alerts = generate_injected(&specs, &zones);
        // entry 0 -> 1 zone, entry 1 -> 2 zones
        assert_eq!(alerts.len(), 3);
        assert!(alerts.iter().all(|a| a.status == Status::Test));

        let ids: HashSet<_> = alerts.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), 3, "ids must be unique per instance");
    }

    #[test]
    fn injected_explicit_zones_win() {
        let zones = vec!["TXC039".to_string()];
        let specs = vec![InjectSpec {
            title: "Heat Advisory".to_string(),
            zones: vec!["AZC013".to_string(), "AZC021".to_string()],
            ends: None,
        }];
        let alerts = generate_injected(&specs, &zones);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.county_codes[0].starts_with("AZC")));
    }

    mod fetch {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        fn collection_body() -> String {
            let now = Utc::now();
            serde_json::json!({
                "features": [{
                    "properties": {
                        "id": "urn:test:good-1",
                        "event": "Flood Watch",
                        "sent": now.to_rfc3339(),
                        "effective": now.to_rfc3339(),
                        "expires": (now + ChronoDuration::hours(2)).to_rfc3339(),
                        "areaDesc": "Test County"
                    }
                }]
            })
            .to_string()
        }

        // Canned alert source. Routes on the zone query parameter:
        // GOOD -> 200 with one alert, MISSING -> 404, FLAKY -> 500 on the
        // first hit then 200, anything else -> 500. Returns the base URL
        // and a total request counter.
        async fn spawn_alert_server() -> (String, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let flaky_hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut sock, _)) = listener.accept().await else {
                        break;
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let flaky = flaky_hits.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 2048];
                        let n = sock.read(&mut buf).await.unwrap_or(0);
                        let req = String::from_utf8_lossy(&buf[..n]).to_string();
                        let (status, body) = if req.contains("zone=GOOD") {
                            ("200 OK", collection_body())
                        } else if req.contains("zone=MISSING") {
                            ("404 Not Found", "{}".to_string())
                        } else if req.contains("zone=FLAKY") {
                            if flaky.fetch_add(1, Ordering::SeqCst) == 0 {
                                ("500 Internal Server Error", "{}".to_string())
                            } else {
                                ("200 OK", collection_body())
                            }
                        } else {
                            ("500 Internal Server Error", "{}".to_string())
                        };
                        let resp = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = sock.write_all(resp.as_bytes()).await;
                        let _ = sock.shutdown().await;
                    });
                }
            });
            (format!("http://{}", addr), hits)
        }

        fn client_for(base: &str, max_retries: u32) -> AlertClient {
            AlertClient::new(AlertClientConfig {
                base_url: base.to_string(),
                timeout_ms: 5_000,
                user_agent: "skywarn-test".to_string(),
                max_retries,
            })
        }

        #[tokio::test]
        async fn zone_union_survives_partial_failure() {
            let (base, _) = spawn_alert_server().await;
            let client = client_for(&base, 0);
            let zones = vec!["GOOD".to_string(), "BAD".to_string()];

            let alerts = client.fetch_zones(&zones).await;
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].id, "urn:test:good-1");
            assert_eq!(alerts[0].event, "Flood Watch");
        }

        #[tokio::test]
        async fn client_errors_are_not_retried() {
            let (base, hits) = spawn_alert_server().await;
            let client = client_for(&base, 3);

            let err = client.fetch_zone("MISSING").await.unwrap_err();
            assert!(matches!(err, SkywarnError::Client(_)), "got {:?}", err);
            assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
        }

        #[tokio::test]
        async fn server_errors_retry_until_success() {
            let (base, hits) = spawn_alert_server().await;
            let client = client_for(&base, 2);

            let alerts = client.fetch_zone("FLAKY").await.unwrap();
            assert_eq!(alerts.len(), 1);
            assert_eq!(hits.load(Ordering::SeqCst), 2, "one retry after the 500");
        }

        #[tokio::test]
        async fn retry_budget_exhaustion_is_a_transport_error() {
            let (base, hits) = spawn_alert_server().await;
            let client = client_for(&base, 1);

            let err = client.fetch_zone("BAD").await.unwrap_err();
            assert!(matches!(err, SkywarnError::Transport(_)), "got {:?}", err);
            assert_eq!(hits.load(Ordering::SeqCst), 2);
        }
    }
}
