//! Text-to-speech engines.
//!
//! Local CLI engines with graceful degradation: prefer Piper (higher
//! quality, requires a voice model), fall back to espeak-ng (widely
//! available). Engines are discovered from env overrides or PATH:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN

use crate::buffer::AudioBuffer;
use crate::util::{from_env_or_path, from_path, gen_id, run_with_timeout, run_with_timeout_stdin};
use crate::wav;
use crate::{AudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const SYNTH_TIMEOUT: Duration = Duration::from_secs(20);

/// A speech backend: plain text in, PCM buffer out.
pub trait TtsEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn synthesize(&self, text: &str) -> Result<AudioBuffer>;
}

/// Which engine to use; `Auto` prefers Piper and falls back to espeak-ng.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Auto,
    Piper,
    Espeak,
}

/// Engine selection and voice knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub engine: EngineKind,
    /// Piper voice model path/name, or espeak voice code.
    pub voice: Option<String>,
    /// Language code passed to espeak when no voice is set.
    pub language: String,
    /// 0.5–2.0, 1.0 is the engine's natural rate.
    pub speaking_rate: f32,
    /// Native rate requested from the engine; the synthesizer resamples
    /// afterwards regardless.
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Auto,
            voice: None,
            language: "en".to_string(),
            speaking_rate: 1.0,
            sample_rate: 22_050,
        }
    }
}

/// Build the configured engine, degrading Piper -> espeak-ng under `Auto`.
pub fn create_engine(cfg: &TtsConfig) -> Result<Box<dyn TtsEngine>> {
    match cfg.engine {
        EngineKind::Piper => {
            PiperEngine::discover(cfg).map(|e| Box::new(e) as Box<dyn TtsEngine>)
        }
        EngineKind::Espeak => {
            EspeakEngine::discover(cfg).map(|e| Box::new(e) as Box<dyn TtsEngine>)
        }
        EngineKind::Auto => {
            if let Ok(piper) = PiperEngine::discover(cfg) {
                return Ok(Box::new(piper));
            }
            EspeakEngine::discover(cfg).map(|e| Box::new(e) as Box<dyn TtsEngine>)
        }
    }
}

pub struct PiperEngine {
    bin: PathBuf,
    voice: PathBuf,
    speaking_rate: f32,
    sample_rate: u32,
    timeout: Duration,
}

impl PiperEngine {
    pub fn discover(cfg: &TtsConfig) -> Result<Self> {
        let bin = from_env_or_path("PIPER_BIN", "piper")
            .ok_or_else(|| AudioError::Synthesis("Piper binary not found".into()))?;
        let voice = resolve_piper_voice(cfg.voice.as_deref()).ok_or_else(|| {
            AudioError::Synthesis("Piper voice not found; set PIPER_VOICE or config voice".into())
        })?;
        info!(target: "tts", bin = ?bin, voice = ?voice, "Detected Piper engine");
        Ok(Self {
            bin,
            voice,
            speaking_rate: cfg.speaking_rate,
            sample_rate: cfg.sample_rate,
            timeout: SYNTH_TIMEOUT,
        })
    }
}

impl TtsEngine for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        let out_wav = std::env::temp_dir().join(format!("skywarn_tts_{}.wav", gen_id()));
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-m").arg(&self.voice);
        cmd.arg("-f").arg(&out_wav);
        let length_scale = (1.0f32 / self.speaking_rate).clamp(0.5, 2.0);
        cmd.arg("--length_scale").arg(format!("{:.2}", length_scale));
        cmd.arg("--sample_rate").arg(self.sample_rate.to_string());

        debug!(target: "tts", command = ?cmd, "Running piper");
        let output = match run_with_timeout_stdin(cmd, text.as_bytes(), self.timeout) {
            Ok(out) => out,
            Err(e) => {
                let _ = std::fs::remove_file(&out_wav);
                return Err(e.into());
            }
        };
        if !output.status.success() {
            let _ = std::fs::remove_file(&out_wav);
            return Err(AudioError::Synthesis(format!(
                "Piper failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let buf = wav::read_wav(&out_wav);
        let _ = std::fs::remove_file(&out_wav);
        buf
    }
}

pub struct EspeakEngine {
    bin: PathBuf,
    voice: String,
    wpm: i32,
}

impl EspeakEngine {
    pub fn discover(cfg: &TtsConfig) -> Result<Self> {
        let bin = from_env_or_path("ESPEAK_BIN", "espeak-ng")
            .or_else(|| from_path("espeak"))
            .ok_or_else(|| AudioError::Synthesis("espeak-ng not found".into()))?;
        let wpm = (160.0 * cfg.speaking_rate).round().clamp(80.0, 450.0) as i32;
        let voice = cfg.voice.clone().unwrap_or_else(|| cfg.language.clone());
        info!(target: "tts", bin = ?bin, voice = %voice, "Detected espeak-ng engine");
        Ok(Self { bin, voice, wpm })
    }
}

impl TtsEngine for EspeakEngine {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        let out_wav = std::env::temp_dir().join(format!("skywarn_tts_{}.wav", gen_id()));
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-v").arg(&self.voice);
        cmd.arg("-s").arg(self.wpm.to_string());
        cmd.arg("-w").arg(&out_wav);
        cmd.arg(text);

        debug!(target: "tts", command = ?cmd, "Running espeak-ng");
        let output = run_with_timeout(cmd, SYNTH_TIMEOUT)?;
        if !output.status.success() {
            let _ = std::fs::remove_file(&out_wav);
            return Err(AudioError::Synthesis(format!(
                "espeak-ng failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let buf = wav::read_wav(&out_wav);
        let _ = std::fs::remove_file(&out_wav);
        buf
    }
}

fn resolve_piper_voice(voice: Option<&str>) -> Option<PathBuf> {
    if let Ok(v) = std::env::var("PIPER_VOICE") {
        let p = PathBuf::from(v);
        if p.exists() {
            return Some(p);
        }
    }
    let name = voice?;
    let direct = PathBuf::from(name);
    if direct.exists() {
        return Some(direct);
    }
    if let Ok(dir) = std::env::var("PIPER_VOICE_DIR") {
        let dir = Path::new(&dir);
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
        for ext in ["onnx", "onnx.gz"] {
            let c = dir.join(format!("{}.{}", name, ext));
            if c.exists() {
                return Some(c);
            }
        }
    }
    None
}
