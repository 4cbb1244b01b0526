//! Host control through configured shell-out commands.
//!
//! Generic alternative to vendor-specific control classes: bench setups
//! wire their relay/strap scripts into a [`HostCommands`] block and get a
//! working [`Host`] without any target-family code.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use log::*;
use serde::Deserialize;

use super::Host;
use crate::tools::run_with_timeout;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Command lines for each control transition. Split on whitespace; no
/// shell quoting.
#[derive(Debug, Clone, Deserialize)]
pub struct HostCommands {
    pub power_on: String,
    pub power_off: String,
    pub flash_mode_on: String,
    pub flash_mode_off: String,
    #[serde(default)]
    pub soft_reset: Option<String>,
}

pub struct CommandHost {
    commands: HostCommands,
}

impl CommandHost {
    pub fn new(commands: HostCommands) -> Self {
        Self { commands }
    }

    fn run(&self, cmdline: &str) -> Result<()> {
        let mut parts = cmdline.split_whitespace();
        let Some(program) = parts.next() else {
            bail!("empty host control command");
        };
        let mut cmd = Command::new(program);
        cmd.args(parts);
        debug!("host control: {cmdline}");
        let out = run_with_timeout(cmd, CONTROL_TIMEOUT)?;
        if !out.success() {
            bail!(
                "host control command `{cmdline}` failed (status {:?}): {}",
                out.status,
                out.output.trim()
            );
        }
        Ok(())
    }
}

impl Host for CommandHost {
    fn set_power(&mut self, on: bool) -> Result<()> {
        let cmdline = if on {
            self.commands.power_on.clone()
        } else {
            self.commands.power_off.clone()
        };
        self.run(&cmdline)
    }

    fn set_flash_mode(&mut self, asserted: bool) -> Result<()> {
        let cmdline = if asserted {
            self.commands.flash_mode_on.clone()
        } else {
            self.commands.flash_mode_off.clone()
        };
        self.run(&cmdline)
    }

    fn soft_reset(&mut self) -> Result<bool> {
        match self.commands.soft_reset.clone() {
            Some(cmdline) => {
                self.run(&cmdline)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
