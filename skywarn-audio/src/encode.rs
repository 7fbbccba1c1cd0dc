//! Container/codec export through an external encoder.
//!
//! WAV is written directly; ulaw (telephony) and mp3 delegate to ffmpeg as a
//! subprocess with a bounded timeout. Failure causes stay distinct so callers
//! can branch on remediation: missing binary, encoder failure, empty output.

use crate::buffer::AudioBuffer;
use crate::util::{from_env_or_path, gen_id, run_with_timeout};
use crate::wav;
use crate::{AudioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

const ENCODER_TIMEOUT: Duration = Duration::from_secs(30);

/// Target container/codec for rendered audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Wav,
    Ulaw,
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Ulaw => "ul",
            ExportFormat::Mp3 => "mp3",
        }
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Ok(ExportFormat::Wav),
            "ul" | "ulaw" | "mulaw" => Ok(ExportFormat::Ulaw),
            "mp3" => Ok(ExportFormat::Mp3),
            other => Err(AudioError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn encoder_bin() -> Result<PathBuf> {
    from_env_or_path("FFMPEG_BIN", "ffmpeg")
        .ok_or_else(|| AudioError::EncoderMissing("ffmpeg".into()))
}

/// Export a buffer to `path` in the requested format.
///
/// Non-WAV formats are forced to mono before encoding; the external control
/// protocol downstream only plays single-channel media.
pub fn export(
    buffer: &AudioBuffer,
    path: &Path,
    format: ExportFormat,
    mp3_bitrate_kbps: u32,
) -> Result<()> {
    match format {
        ExportFormat::Wav => wav::write_wav(buffer, path),
        ExportFormat::Ulaw => {
            let mono = buffer.to_mono();
            with_temp_wav(&mono, |tmp| {
                let mut cmd = Command::new(encoder_bin()?);
                cmd.arg("-y")
                    .arg("-i")
                    .arg(tmp)
                    .arg("-ar")
                    .arg(mono.sample_rate().to_string())
                    .arg("-ac")
                    .arg("1")
                    .arg("-f")
                    .arg("mulaw")
                    .arg(path);
                run_encoder(cmd, path)
            })
        }
        ExportFormat::Mp3 => {
            let mono = buffer.to_mono();
            with_temp_wav(&mono, |tmp| {
                let mut cmd = Command::new(encoder_bin()?);
                cmd.arg("-y")
                    .arg("-i")
                    .arg(tmp)
                    .arg("-ar")
                    .arg(mono.sample_rate().to_string())
                    .arg("-ac")
                    .arg("1")
                    .arg("-codec:a")
                    .arg("libmp3lame")
                    .arg("-b:a")
                    .arg(format!("{}k", mp3_bitrate_kbps))
                    .arg(path);
                run_encoder(cmd, path)
            })
        }
    }
}

/// Load an audio file, decoding mp3/ulaw through the external encoder.
pub fn load(path: &Path) -> Result<AudioBuffer> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("wav");
    match ExportFormat::from_extension(ext)? {
        ExportFormat::Wav => wav::read_wav(path),
        ExportFormat::Mp3 => decode_via_encoder(path, &[]),
        ExportFormat::Ulaw => {
            // Raw mulaw carries no header; assume 8 kHz mono telephony audio.
            decode_via_encoder(path, &["-f", "mulaw", "-ar", "8000", "-ac", "1"])
        }
    }
}

fn decode_via_encoder(path: &Path, input_args: &[&str]) -> Result<AudioBuffer> {
    let tmp = std::env::temp_dir().join(format!("skywarn_dec_{}.wav", gen_id()));
    let mut cmd = Command::new(encoder_bin()?);
    cmd.arg("-y");
    for a in input_args {
        cmd.arg(a);
    }
    cmd.arg("-i").arg(path).arg(&tmp);
    let res = run_encoder(cmd, &tmp).and_then(|_| wav::read_wav(&tmp));
    let _ = std::fs::remove_file(&tmp);
    res
}

fn with_temp_wav<F>(buffer: &AudioBuffer, f: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = std::env::temp_dir().join(format!("skywarn_enc_{}.wav", gen_id()));
    wav::write_wav(buffer, &tmp)?;
    let res = f(&tmp);
    let _ = std::fs::remove_file(&tmp);
    res
}

fn run_encoder(cmd: Command, output: &Path) -> Result<()> {
    debug!(target: "audio", command = ?cmd, "Running encoder");
    let out = run_with_timeout(cmd, ENCODER_TIMEOUT)?;
    if !out.status.success() {
        return Err(AudioError::EncoderFailed {
            path: output.to_path_buf(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    wait_for_output(output)
}

/// Verify the encoder produced a non-empty file, polling briefly: some
/// encoders report exit before the file is flushed.
fn wait_for_output(path: &Path) -> Result<()> {
    for _ in 0..10 {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => return Ok(()),
            Ok(_) | Err(_) => std::thread::sleep(Duration::from_millis(50)),
        }
    }
    warn!(target: "audio", path = ?path, "Encoder exited without producing output");
    Err(AudioError::EmptyOutput(path.to_path_buf()))
}
