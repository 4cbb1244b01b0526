//! Scoped daemon serving the boot image directory to the bootloader.
//!
//! The bootloader pulls the image over its source medium (typically USB)
//! from a host-side server process. The server only needs to exist while
//! the flash tool drives the copy, so it is held as a drop guard.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

use super::{DaemonGuard, spawn_daemon};

pub struct ImageServer {
    pub program: String,
    pub args: Vec<String>,
    /// Directory the image is served from.
    pub directory: PathBuf,
}

impl ImageServer {
    pub fn new(program: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            directory: directory.into(),
        }
    }

    pub fn start(&self) -> Result<DaemonGuard> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.directory);
        spawn_daemon(cmd, "image server")
            .with_context(|| format!("starting {} in {}", self.program, self.directory.display()))
    }
}
