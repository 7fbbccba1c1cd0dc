//! Shared audio utilities: timestamps, ids, binary discovery, bounded subprocess runs.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Timestamp in milliseconds since UNIX epoch, used for file naming and spans.
#[inline]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a simple unique id based on current time in nanoseconds.
/// Sufficient for tagging short-lived temp files.
#[inline]
pub fn gen_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}", nanos)
}

/// Resolve a binary from an env override, falling back to a PATH scan.
pub fn from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    from_path(default_bin)
}

/// Resolve a binary by scanning PATH. Absolute/relative paths are checked directly.
pub fn from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    if let Ok(paths) = std::env::var("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(bin);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Run a prepared command to completion with a hard deadline.
///
/// The child is killed when the deadline passes; a timeout surfaces as
/// `io::ErrorKind::TimedOut` so callers can treat it as a fatal error for
/// that single invocation.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<Output> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let child = cmd.spawn()?;
    wait_with_deadline(child, timeout)
}

/// Like `run_with_timeout`, feeding `input` to the child's stdin first.
/// The input must fit the pipe buffer; narration-sized text does.
pub fn run_with_timeout_stdin(
    mut cmd: Command,
    input: &[u8],
    timeout: Duration,
) -> std::io::Result<Output> {
    use std::io::Write;

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(input) {
            // a child that exits without reading stdin is judged by its
            // exit status, not the broken pipe
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    }
    wait_with_deadline(child, timeout)
}

fn wait_with_deadline(
    mut child: std::process::Child,
    timeout: Duration,
) -> std::io::Result<Output> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(_) => return child.wait_with_output(),
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("command timed out after {:?}", timeout),
                    ));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_id_is_nonempty_hex() {
        let id = gen_id();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn from_path_finds_sh() {
        // /bin/sh exists on every platform we target
        assert!(from_path("sh").is_some() || from_path("/bin/sh").is_some());
    }

    #[test]
    fn run_with_timeout_kills_slow_commands() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_timeout(cmd, Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    fn stdin_is_fed_to_the_child() {
        let cmd = Command::new("cat");
        let out = run_with_timeout_stdin(cmd, b"hello", Duration::from_secs(5)).unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, b"hello");
    }

    #[test]
    fn stdin_runs_still_honor_the_deadline() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_timeout_stdin(cmd, b"ignored", Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
