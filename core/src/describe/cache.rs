//! On-disk cache of synthesized alert narrations.
//!
//! One audio file per distinct narration text. Synthesis for a given cache
//! key is mutually exclusive so concurrent DTMF requests for the same alert
//! produce one file, not a pile of half-written ones.

use crate::alerts::WeatherAlert;
use crate::describe::text;
use crate::dtmf::StatusSnapshot;
use crate::{Result, SkywarnError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use skywarn_audio::{util, SpeechSynthesizer};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeConfig {
    pub descriptions_dir: PathBuf,
    /// Word cap applied to narrations before synthesis.
    pub max_words: usize,
    /// Entries and orphaned files older than this are swept by `cleanup`.
    pub max_age_hours: u64,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            descriptions_dir: PathBuf::from("/tmp/skywarn/descriptions"),
            max_words: text::DEFAULT_MAX_WORDS,
            max_age_hours: 24,
        }
    }
}

/// One rendered narration, ready for playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionAudio {
    pub key: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub text: String,
}

pub struct DescriptionCache {
    cfg: DescribeConfig,
    synth: Arc<SpeechSynthesizer>,
    entries: DashMap<String, DescriptionAudio>,
    // Per-key synthesis locks. Entries are never removed; the set of keys is
    // bounded by the active alert population plus a few sentinels.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

fn safe_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn text_fingerprint(text: &str) -> String {
    let mut h = DefaultHasher::new();
    text.hash(&mut h);
    format!("{:016x}", h.finish())
}

impl DescriptionCache {
    pub fn new(synth: Arc<SpeechSynthesizer>, cfg: DescribeConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.descriptions_dir)?;
        Ok(Self {
            cfg,
            synth,
            entries: DashMap::new(),
            locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &DescribeConfig {
        &self.cfg
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn render_to(&self, text: String, path: PathBuf) -> Result<f64> {
        let synth = self.synth.clone();
        let out = path.clone();
        tokio::task::spawn_blocking(move || -> Result<f64> {
            synth.synthesize(&text, &out)?;
            Ok(synth.duration_of(&out))
        })
        .await
        .map_err(|e| SkywarnError::Dispatch(format!("synthesis task failed: {}", e)))?
    }

    /// Render `text` under a stable cache key, reusing the existing file when
    /// the narration text is unchanged and the file is still on disk.
    pub async fn speak_cached(&self, key: &str, narration: &str) -> Result<DescriptionAudio> {
        let narration = text::normalize_for_speech(narration, self.cfg.max_words);
        let key = safe_key(key);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.entries.get(&key) {
            if entry.text == narration && entry.path.is_file() {
                debug!(target: "describe", key = %key, "Cache hit");
                return Ok(entry.clone());
            }
            // text changed or the file was removed behind our back
            debug!(target: "describe", key = %key, "Stale cache entry, re-synthesizing");
        }

        let ext = self.synth.config().format.extension();
        let filename = format!("desc_{}_{}.{}", key, text_fingerprint(&narration), ext);
        let path = self.cfg.descriptions_dir.join(filename);
        let duration_seconds = self.render_to(narration.clone(), path.clone()).await?;

        let entry = DescriptionAudio {
            key: key.clone(),
            path,
            created_at: Utc::now(),
            duration_seconds,
            text: narration,
        };
        info!(
            target: "describe",
            key = %key,
            seconds = entry.duration_seconds,
            "Cached narration"
        );
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Render `text` into a uniquely named file, bypassing the cache. Used
    /// for narrations whose content changes on every request.
    pub async fn speak_fresh(&self, prefix: &str, narration: &str) -> Result<DescriptionAudio> {
        let narration = text::normalize_for_speech(narration, self.cfg.max_words);
        let ext = self.synth.config().format.extension();
        let filename = format!("{}_{}.{}", safe_key(prefix), util::gen_id(), ext);
        let path = self.cfg.descriptions_dir.join(filename);
        let duration_seconds = self.render_to(narration.clone(), path.clone()).await?;
        Ok(DescriptionAudio {
            key: safe_key(prefix),
            path,
            created_at: Utc::now(),
            duration_seconds,
            text: narration,
        })
    }

    /// Long-form narration for one alert, cached by alert id.
    pub async fn describe_alert(&self, alert: &WeatherAlert) -> Result<DescriptionAudio> {
        self.speak_cached(&alert.id, &text::alert_narration(alert))
            .await
    }

    /// Summary of the active set; always freshly rendered.
    pub async fn current_alerts(&self, alerts: &[WeatherAlert]) -> Result<DescriptionAudio> {
        self.speak_fresh("current_alerts", &text::current_alerts_narration(alerts))
            .await
    }

    /// The canned all-clear announcement, cached.
    pub async fn all_clear(&self) -> Result<DescriptionAudio> {
        self.speak_cached("all_clear", &text::all_clear_narration())
            .await
    }

    /// System status narration; always freshly rendered.
    pub async fn system_status(&self, status: &StatusSnapshot) -> Result<DescriptionAudio> {
        self.speak_fresh("system_status", &text::system_status_narration(status))
            .await
    }

    /// Drop the cached narration for an alert and delete its files on disk.
    pub fn invalidate(&self, alert_id: &str) {
        let key = safe_key(alert_id);
        self.entries.remove(&key);
        let prefix = format!("desc_{}_", key);
        for path in self.dir_files_with_prefix(&prefix) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(target: "describe", path = ?path, error = %e, "Failed to remove narration");
            }
        }
        debug!(target: "describe", key = %key, "Invalidated narration");
    }

    /// Remove entries and orphaned files older than `max_age_hours`. Returns
    /// how many cache entries were dropped.
    pub fn cleanup(&self, max_age_hours: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours as i64);
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.created_at < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for key in &stale {
            if let Some((_, entry)) = self.entries.remove(key) {
                let _ = std::fs::remove_file(&entry.path);
            }
        }

        // Files with no live entry, left behind by crashes or restarts
        let max_age = std::time::Duration::from_secs(max_age_hours.saturating_mul(3600));
        let mut swept = 0usize;
        if let Ok(read) = std::fs::read_dir(&self.cfg.descriptions_dir) {
            for entry in read.flatten() {
                let path = entry.path();
                if !path.is_file() || self.is_live(&path) {
                    continue;
                }
                let old = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|t| t.elapsed().unwrap_or_default() >= max_age)
                    .unwrap_or(false);
                if old && std::fs::remove_file(&path).is_ok() {
                    swept += 1;
                }
            }
        }
        if !stale.is_empty() || swept > 0 {
            info!(
                target: "describe",
                entries = stale.len(),
                orphans = swept,
                "Cleaned up narrations"
            );
        }
        stale.len()
    }

    fn is_live(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    fn dir_files_with_prefix(&self, prefix: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Ok(read) = std::fs::read_dir(&self.cfg.descriptions_dir) {
            for entry in read.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with(prefix) {
                    out.push(entry.path());
                }
            }
        }
        out
    }
}
