//! Pre-test shell command stage.

use std::time::Duration;

use anyhow::Result;
use log::*;

use super::Harness;
use crate::device::Channel;
use crate::types::TestResult;

const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Non-terminal stage that synchronizes on the target's shell prompt and
/// issues a command there. Reading the command's output is left to the
/// terminal stage.
pub struct ShellHarness {
    cmd: String,
    prompt: String,
    timeout: Duration,
}

impl ShellHarness {
    pub fn new(cmd: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            prompt: prompt.into(),
            timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Harness for ShellHarness {
    fn run(&mut self, dut: &mut dyn Channel) -> Result<Option<TestResult>> {
        dut.expect(&self.prompt, self.timeout)?;
        debug!("shell ready, sending `{}`", self.cmd);
        dut.write_line(&self.cmd)?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "shell"
    }
}
