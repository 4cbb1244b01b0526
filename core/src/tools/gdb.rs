//! Debug-server session and the GDB batch loader that runs inside it.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use log::*;

use super::{DaemonGuard, FlashError, run_with_timeout, spawn_daemon};

/// Default budget for one batch load over the debug link
pub const LOADER_TIMEOUT: Duration = Duration::from_secs(20);

/// A debug server bound to the target's debug probe.
///
/// The server holds a debug port, so it must never outlive the load it was
/// started for; [`GdbServer::run`] returns a guard that terminates it on
/// drop, on every exit path.
pub struct GdbServer {
    pub program: String,
    pub args: Vec<String>,
}

impl GdbServer {
    /// J-Link server for the given device name.
    pub fn new(device: &str) -> Self {
        Self {
            program: "JLinkGDBServer".into(),
            args: vec!["-device".into(), device.into(), "-silent".into()],
        }
    }

    pub fn run(&self) -> Result<DaemonGuard> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        spawn_daemon(cmd, "debug server").with_context(|| format!("starting {}", self.program))
    }
}

/// Loads the boot image into target RAM via a GDB batch script
/// (`gdb <elf> -x <script> -batch`), inside a scoped debug-server session.
pub struct GdbScriptLoader {
    pub server: GdbServer,
    pub elf: String,
    pub script: PathBuf,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// GDB front end to invoke.
    pub program: String,
}

impl GdbScriptLoader {
    pub fn new(server: GdbServer, elf: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            server,
            elf: elf.into(),
            script: script.into(),
            cwd: None,
            timeout: LOADER_TIMEOUT,
            program: "gdb-multiarch".into(),
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Run the load to completion. Tool missing, non-zero exit and an
    /// elapsed budget all become a [`FlashError`] with the tool's output.
    pub fn load(&self) -> Result<(), FlashError> {
        let _server = self
            .server
            .run()
            .map_err(|e| FlashError::new(format!("debug server: {e:#}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.elf).arg("-x").arg(&self.script).arg("-batch");
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        info!("loading image via {} {}", self.program, self.elf);

        let out = run_with_timeout(cmd, self.timeout)
            .map_err(|e| FlashError::new(format!("{}: {e}", self.program)))?;
        if out.timed_out {
            return Err(FlashError::with_output(
                format!("image loader timed out after {:?}", self.timeout),
                out.output,
            ));
        }
        if !out.success() {
            return Err(FlashError::with_output(
                format!("image loader exited with status {:?}", out.status),
                out.output,
            ));
        }
        Ok(())
    }
}
