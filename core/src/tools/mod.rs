//! Bounded invocation of external tools.
//!
//! Every subprocess the framework starts is either run to completion under
//! a deadline ([`run_with_timeout`]) or held as a scoped daemon that is
//! killed when its guard drops. An elapsed deadline is always a reported
//! failure, never a hang.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::*;
use thiserror::Error;

pub mod flashtool;
pub mod gdb;
pub mod imageserver;
#[cfg(test)]
pub mod testtool;

const WAIT_POLL: Duration = Duration::from_millis(10);
const DAEMON_SETTLE: Duration = Duration::from_millis(100);

/// Flashing pipeline failure (taxonomy kind: flash).
///
/// Carries the tool's captured output so a human can diagnose a hardware
/// or tooling problem from the report alone.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct FlashError {
    pub message: String,
    pub output: Option<String>,
}

impl FlashError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: None,
        }
    }

    pub fn with_output(message: impl Into<String>, output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            message: message.into(),
            output: if output.is_empty() { None } else { Some(output) },
        }
    }
}

/// Captured outcome of a bounded tool run
#[derive(Debug)]
pub struct ToolOutput {
    /// Exit code; `None` when the process died to a signal or was killed
    /// on timeout.
    pub status: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }
}

fn drain(reader: Option<impl Read + Send + 'static>) -> Option<JoinHandle<String>> {
    reader.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// Output is drained on separate threads so a chatty tool cannot dead-lock
/// against a full pipe; both streams are joined before returning.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<ToolOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            timed_out = true;
            if let Err(e) = child.kill() {
                warn!("could not kill timed-out tool: {e}");
            }
            break child.wait().ok();
        }
        thread::sleep(WAIT_POLL);
    };

    let mut output = join(stdout);
    let err_output = join(stderr);
    if !err_output.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&err_output);
    }

    Ok(ToolOutput {
        status: status.and_then(|s| s.code()),
        output,
        timed_out,
    })
}

/// A background tool held for the duration of a scope; killed on drop.
pub struct DaemonGuard {
    what: String,
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("could not stop {}: {e}", self.what);
        }
        let _ = self.child.wait();
        debug!("stopped {}", self.what);
    }
}

/// Spawn a daemon-style tool and confirm it did not die on startup.
pub fn spawn_daemon(mut cmd: Command, what: &str) -> std::io::Result<DaemonGuard> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = cmd.spawn()?;
    thread::sleep(DAEMON_SETTLE);
    if let Some(status) = child.try_wait()? {
        return Err(std::io::Error::other(format!(
            "{what} exited immediately with {status}"
        )));
    }
    debug!("started {what} (pid {})", child.id());
    Ok(DaemonGuard {
        what: what.to_string(),
        child,
    })
}
