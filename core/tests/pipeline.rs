//! End-to-end: parsed alerts through narration, DTMF dispatch, and playback.

use chrono::{Duration, Utc};
use skywarn_audio::{AudioBuffer, SpeechSynthesizer, SynthesizerConfig, TtsEngine};
use skywarn_core::alerts::client;
use skywarn_core::alerts::model::{RawProperties, WeatherAlert};
use skywarn_core::alerts::TimeBasis;
use skywarn_core::playback::{strip_media_extension, AsteriskBridge, AsteriskConfig, PlaybackMode};
use skywarn_core::{
    AlertLookup, AlertsProvider, DescribeConfig, DescriptionCache, DtmfConfig, DtmfDispatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct ToneEngine;

impl TtsEngine for ToneEngine {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn synthesize(&self, _text: &str) -> skywarn_audio::Result<AudioBuffer> {
        let samples: Vec<f32> = (0..8_000).map(|i| (i as f32 * 0.07).sin() * 0.4).collect();
        AudioBuffer::new(samples, 8_000, 1)
    }
}

fn parsed_alert(id: &str, event: &str, hours_left: i64) -> WeatherAlert {
    let now = Utc::now();
    let props: RawProperties = serde_json::from_value(serde_json::json!({
        "id": id,
        "event": event,
        "description": "Winds to 50mph expected until 430PM CDT",
        "severity": "Severe",
        "urgency": "Immediate",
        "certainty": "Likely",
        "status": "Actual",
        "category": "Met",
        "sent": now.to_rfc3339(),
        "effective": now.to_rfc3339(),
        "expires": (now + Duration::hours(hours_left)).to_rfc3339(),
        "areaDesc": "Galveston County",
        "geocode": {"SAME": ["048167"], "UGC": ["TXZ214"]}
    }))
    .unwrap();
    WeatherAlert::from_properties(props).unwrap()
}

struct Fixed(Vec<WeatherAlert>);

impl AlertsProvider for Fixed {
    fn current_alerts(&self) -> Vec<WeatherAlert> {
        self.0.clone()
    }
}

impl AlertLookup for Fixed {
    fn lookup(&self, digits: &str) -> Option<WeatherAlert> {
        digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.0.get(i).cloned())
    }
}

fn current_username() -> String {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    let uid: u32 = status
        .lines()
        .find(|l| l.starts_with("Uid:"))
        .and_then(|l| l.split_whitespace().nth(2))
        .and_then(|u| u.parse().ok())
        .unwrap();
    let passwd = std::fs::read_to_string("/etc/passwd").unwrap();
    passwd
        .lines()
        .find_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            (fields.nth(1)?.parse::<u32>().ok()? == uid).then(|| name.to_string())
        })
        .unwrap()
}

fn cache_in(dir: &Path) -> Arc<DescriptionCache> {
    let synth = Arc::new(SpeechSynthesizer::new(
        Box::new(ToneEngine),
        SynthesizerConfig::default(),
    ));
    let cfg = DescribeConfig {
        descriptions_dir: dir.to_path_buf(),
        ..Default::default()
    };
    Arc::new(DescriptionCache::new(synth, cfg).unwrap())
}

#[tokio::test]
async fn dtmf_narration_lands_on_the_repeater() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());

    // two alerts, one already expired; only the live one survives filtering
    let batch = vec![
        parsed_alert("urn:test:live", "Severe Thunderstorm Warning", 2),
        parsed_alert("urn:test:live", "Severe Thunderstorm Warning", 2),
        parsed_alert("urn:test:dead", "Flood Watch", -1),
    ];
    let unique = client::dedup_alerts(batch);
    assert_eq!(unique.len(), 2);
    let active = client::filter_active(&unique, TimeBasis::Effective);
    assert_eq!(active.len(), 1);

    let provider = Arc::new(Fixed(active));
    let dispatcher = DtmfDispatcher::new(cache, DtmfConfig::default())
        .with_alerts(provider.clone())
        .with_lookup(provider);

    // narration text reflects normalization of the upstream prose
    let described = dispatcher.dispatch("*2", Some("1")).await;
    assert!(described.success, "got: {}", described.message);
    let audio = described.audio.unwrap();
    assert!(audio.path.is_file());
    assert!(audio.text.contains("50 miles per hour"), "got: {}", audio.text);
    assert!(audio.text.contains("4:30PM"), "got: {}", audio.text);

    // the rendered file plays through the bridge on every node
    let bridge = AsteriskBridge::new(AsteriskConfig {
        asterisk_bin: PathBuf::from("/bin/true"),
        nodes: vec!["1999".to_string(), "2000".to_string()],
        command_timeout_ms: 2_000,
        run_as_user: current_username(),
    });
    let results = bridge
        .play_default(&audio.path, PlaybackMode::Global)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));

    // the control protocol addresses the file by base name
    let base = strip_media_extension(&audio.path);
    assert!(!base.ends_with(".wav"));
}

#[tokio::test]
async fn summary_and_detail_share_one_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(dir.path());
    let provider = Arc::new(Fixed(vec![parsed_alert(
        "urn:test:one",
        "Tornado Warning",
        3,
    )]));
    let dispatcher = DtmfDispatcher::new(cache, DtmfConfig::default())
        .with_alerts(provider.clone())
        .with_lookup(provider);

    let summary = dispatcher.dispatch("*1", None).await;
    assert!(summary.success, "got: {}", summary.message);
    assert!(summary.audio.unwrap().text.contains("1 active weather alerts"));

    let a = dispatcher.dispatch("*2", Some("1")).await.audio.unwrap();
    let b = dispatcher.dispatch("*2", Some("1")).await.audio.unwrap();
    assert_eq!(a.path, b.path);
}
