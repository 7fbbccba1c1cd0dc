//! Speech synthesis pipeline.
//!
//! Engine output is forced mono, resampled to the configured target rate,
//! peak-normalized, then exported to the configured container. Synthesis and
//! export are blocking; callers on an event loop should wrap calls in
//! `spawn_blocking`.

use crate::buffer::AudioBuffer;
use crate::encode::{self, ExportFormat};
use crate::tts::{create_engine, TtsConfig, TtsEngine};
use crate::{wav, AudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Output rate after resampling; 8 kHz for telephony targets.
    pub target_sample_rate: u32,
    pub format: ExportFormat,
    pub mp3_bitrate_kbps: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 8_000,
            format: ExportFormat::Wav,
            mp3_bitrate_kbps: 128,
        }
    }
}

pub struct SpeechSynthesizer {
    engine: Box<dyn TtsEngine>,
    cfg: SynthesizerConfig,
}

impl SpeechSynthesizer {
    pub fn new(engine: Box<dyn TtsEngine>, cfg: SynthesizerConfig) -> Self {
        Self { engine, cfg }
    }

    /// Build from configuration, discovering the engine binary.
    pub fn from_config(tts: &TtsConfig, cfg: SynthesizerConfig) -> Result<Self> {
        let engine = create_engine(tts)?;
        info!(target: "tts", engine = engine.name(), "Speech synthesizer ready");
        Ok(Self { engine, cfg })
    }

    pub fn config(&self) -> &SynthesizerConfig {
        &self.cfg
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Synthesize to an in-memory buffer in the configured target format.
    pub fn render(&self, text: &str) -> Result<AudioBuffer> {
        if text.trim().is_empty() {
            return Err(AudioError::Synthesis("text cannot be empty".into()));
        }
        debug!(target: "tts", chars = text.len(), "Synthesizing text");
        let raw = self.engine.synthesize(text)?;
        let buf = raw
            .to_mono()
            .resample(self.cfg.target_sample_rate)?
            .normalize();
        Ok(buf)
    }

    /// Synthesize `text` into `output_path` using the configured format.
    pub fn synthesize(&self, text: &str, output_path: &Path) -> Result<PathBuf> {
        self.synthesize_as(text, output_path, self.cfg.format)
    }

    /// Synthesize `text` into `output_path` in an explicit format.
    pub fn synthesize_as(
        &self,
        text: &str,
        output_path: &Path,
        format: ExportFormat,
    ) -> Result<PathBuf> {
        let buf = self.render(text)?;
        encode::export(&buf, output_path, format, self.cfg.mp3_bitrate_kbps)?;
        info!(
            target: "tts",
            path = ?output_path,
            seconds = buf.duration_seconds(),
            "Synthesized audio"
        );
        Ok(output_path.to_path_buf())
    }

    /// Spoken duration of a rendered file in seconds.
    ///
    /// Returns 0.0 when the duration cannot be determined for the format;
    /// callers must tolerate a zero.
    pub fn duration_of(&self, path: &Path) -> f64 {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ExportFormat::from_extension(ext) {
            Ok(ExportFormat::Wav) => match wav::read_wav(path) {
                Ok(buf) => buf.duration_seconds(),
                Err(e) => {
                    warn!(target: "tts", path = ?path, error = %e, "Failed to read WAV duration");
                    0.0
                }
            },
            // Raw mulaw is one byte per sample at 8 kHz.
            Ok(ExportFormat::Ulaw) => std::fs::metadata(path)
                .map(|m| m.len() as f64 / 8_000.0)
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ToneEngine {
        calls: Arc<AtomicUsize>,
    }

    impl TtsEngine for ToneEngine {
        fn name(&self) -> &'static str {
            "tone"
        }

        fn synthesize(&self, _text: &str) -> Result<AudioBuffer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // one second of quiet tone at a non-target rate, stereo
            let samples: Vec<f32> = (0..22050)
                .map(|i| (i as f32 * 0.1).sin() * 0.25)
                .collect();
            AudioBuffer::new(samples, 22_050, 1).map(|b| b.to_stereo())
        }
    }

    fn synthesizer(calls: Arc<AtomicUsize>) -> SpeechSynthesizer {
        SpeechSynthesizer::new(
            Box::new(ToneEngine { calls }),
            SynthesizerConfig::default(),
        )
    }

    #[test]
    fn empty_text_is_a_synthesis_error() {
        let synth = synthesizer(Arc::new(AtomicUsize::new(0)));
        match synth.render("   ") {
            Err(AudioError::Synthesis(_)) => {}
            other => panic!("expected Synthesis error, got {:?}", other),
        }
    }

    #[test]
    fn pipeline_reaches_target_format() {
        let synth = synthesizer(Arc::new(AtomicUsize::new(0)));
        let buf = synth.render("test announcement").unwrap();
        assert_eq!(buf.channels(), 1);
        assert_eq!(buf.sample_rate(), 8_000);
        let peak = buf.samples().iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn synthesize_writes_wav_and_reports_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("announce.wav");
        let calls = Arc::new(AtomicUsize::new(0));
        let synth = synthesizer(calls.clone());

        let out = synth.synthesize("severe thunderstorm warning", &path).unwrap();
        assert_eq!(out, path);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let dur = synth.duration_of(&path);
        assert!((dur - 1.0).abs() < 0.05, "duration was {}", dur);
    }

    #[test]
    fn duration_is_zero_when_undeterminable() {
        let synth = synthesizer(Arc::new(AtomicUsize::new(0)));
        assert_eq!(synth.duration_of(Path::new("/nonexistent/file.mp3")), 0.0);
    }
}
