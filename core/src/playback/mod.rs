//! Repeater playback via the Asterisk control socket.
//!
//! One `rpt` command per node. Node failures are independent; a dead node
//! never blocks the others, so results come back as a per-node vector.

use crate::{Result, SkywarnError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Extensions the control protocol strips; media is addressed by base name.
const MEDIA_EXTENSIONS: &[&str] = &["wav", "mp3", "gsm", "ul", "ulaw"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Audible on the local node only.
    #[default]
    Local,
    /// Propagated to all linked nodes.
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsteriskConfig {
    pub asterisk_bin: PathBuf,
    /// Node numbers addressed by default when the caller passes none.
    pub nodes: Vec<String>,
    pub command_timeout_ms: u64,
    /// Identity the Asterisk service runs as. Commands are wrapped in
    /// `sudo -n -u <user>` unless the process already runs as that user.
    pub run_as_user: String,
}

impl Default for AsteriskConfig {
    fn default() -> Self {
        Self {
            asterisk_bin: PathBuf::from("/usr/sbin/asterisk"),
            nodes: Vec::new(),
            command_timeout_ms: 10_000,
            run_as_user: "asterisk".to_string(),
        }
    }
}

/// Outcome of one `rpt` command on one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: String,
    pub success: bool,
    pub detail: String,
}

/// Strip a known media extension; unknown extensions are left intact.
pub fn strip_media_extension(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(e) if MEDIA_EXTENSIONS.contains(&e.as_str()) => {
            path.with_extension("").to_string_lossy().into_owned()
        }
        _ => path.to_string_lossy().into_owned(),
    }
}

/// Effective uid of this process, from `/proc/self/status` (fields after
/// `Uid:` are real, effective, saved, fs).
fn current_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("Uid:"))?;
    line.split_whitespace().nth(2)?.parse().ok()
}

fn uid_of_user(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let mut fields = line.split(':');
        if fields.next() == Some(name) {
            return fields.nth(1).and_then(|u| u.parse().ok());
        }
    }
    None
}

pub struct AsteriskBridge {
    cfg: AsteriskConfig,
}

impl AsteriskBridge {
    pub fn new(cfg: AsteriskConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AsteriskConfig {
        &self.cfg
    }

    /// Whether the command needs the sudo wrapper. Compares effective uid
    /// against the service user's uid; the `USER` env var is unset under
    /// service managers and cannot be trusted. Unresolvable identities keep
    /// the wrapper.
    fn needs_sudo(&self) -> bool {
        match (current_uid(), uid_of_user(&self.cfg.run_as_user)) {
            (Some(me), Some(target)) => me != target,
            _ => true,
        }
    }

    /// Best-effort check that the playback identity can read the file. An
    /// inconclusive probe logs and continues; playback itself will surface
    /// the real failure per node.
    fn probe_readable(&self, path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            match std::fs::metadata(path) {
                Ok(meta) => {
                    let mode = meta.permissions().mode();
                    if self.needs_sudo() && mode & 0o004 == 0 {
                        warn!(
                            target: "playback",
                            path = ?path,
                            mode = format!("{:o}", mode & 0o777),
                            user = %self.cfg.run_as_user,
                            "Audio file may not be readable by the playback user"
                        );
                    }
                }
                Err(e) => {
                    warn!(target: "playback", path = ?path, error = %e, "Permission probe inconclusive");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = path;
    }

    async fn run_rpt(&self, node: &str, rpt_command: &str) -> NodeResult {
        let cli = format!("rpt {}", rpt_command);
        debug!(target: "playback", node = %node, command = %cli, "Issuing rpt command");

        let mut cmd = if self.needs_sudo() {
            let mut c = Command::new("sudo");
            c.arg("-n")
                .arg("-u")
                .arg(&self.cfg.run_as_user)
                .arg(&self.cfg.asterisk_bin);
            c
        } else {
            Command::new(&self.cfg.asterisk_bin)
        };
        cmd.arg("-rx").arg(&cli).kill_on_drop(true);

        let timeout = Duration::from_millis(self.cfg.command_timeout_ms);
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => NodeResult {
                node: node.to_string(),
                success: true,
                detail: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            },
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!(target: "playback", node = %node, exit = ?output.status.code(), stderr = %stderr, "rpt command failed");
                NodeResult {
                    node: node.to_string(),
                    success: false,
                    detail: format!("exit {:?}: {}", output.status.code(), stderr),
                }
            }
            Ok(Err(e)) => {
                warn!(target: "playback", node = %node, error = %e, "Failed to spawn rpt command");
                NodeResult {
                    node: node.to_string(),
                    success: false,
                    detail: e.to_string(),
                }
            }
            Err(_) => {
                warn!(target: "playback", node = %node, timeout_ms = self.cfg.command_timeout_ms, "rpt command timed out");
                NodeResult {
                    node: node.to_string(),
                    success: false,
                    detail: format!("timed out after {} ms", self.cfg.command_timeout_ms),
                }
            }
        }
    }

    /// Play `path` on each node, continuing past per-node failures.
    pub async fn play(
        &self,
        path: &Path,
        nodes: &[String],
        mode: PlaybackMode,
    ) -> Result<Vec<NodeResult>> {
        if !path.is_file() {
            return Err(SkywarnError::Playback(format!(
                "audio file not found: {}",
                path.display()
            )));
        }
        self.probe_readable(path);

        let base = strip_media_extension(path);
        let verb = match mode {
            PlaybackMode::Local => "localplay",
            PlaybackMode::Global => "playback",
        };

        let mut results = Vec::with_capacity(nodes.len());
        for node in nodes {
            let rpt = format!("{} {} {}", verb, node, base);
            results.push(self.run_rpt(node, &rpt).await);
        }
        let ok = results.iter().filter(|r| r.success).count();
        info!(
            target: "playback",
            path = ?path,
            mode = ?mode,
            ok,
            total = results.len(),
            "Playback dispatched"
        );
        Ok(results)
    }

    /// Play on the configured default nodes.
    pub async fn play_default(&self, path: &Path, mode: PlaybackMode) -> Result<Vec<NodeResult>> {
        let nodes = self.cfg.nodes.clone();
        self.play(path, &nodes, mode).await
    }

    /// Interrupt any announcement in progress on each node.
    pub async fn stop(&self, nodes: &[String]) -> Vec<NodeResult> {
        let mut results = Vec::with_capacity(nodes.len());
        for node in nodes {
            let rpt = format!("stop {}", node);
            results.push(self.run_rpt(node, &rpt).await);
        }
        results
    }
}
