//! Driver for the target's boot-stage command prompt.

use std::time::Duration;

use log::*;

use crate::device::{Channel, ChannelError};

const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// Interactive prompt exposed by the target's boot-stage firmware.
///
/// Entered by interrupting autoboot over the device channel; once the
/// prompt is observed the host-side flash tooling can take over.
pub struct Bootloader {
    prompt: String,
    /// Byte sequence that interrupts autoboot.
    interrupt: Vec<u8>,
    prompt_timeout: Duration,
}

impl Bootloader {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            interrupt: b"\n".to_vec(),
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: impl Into<Vec<u8>>) -> Self {
        self.interrupt = interrupt.into();
        self
    }

    #[must_use]
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Send the enter-bootloader sequence.
    pub fn enter(&self, dut: &mut dyn Channel) -> Result<(), ChannelError> {
        debug!("interrupting autoboot");
        dut.write(&self.interrupt)
    }

    /// Block until the bootloader's interactive prompt appears.
    ///
    /// A missing prompt is a channel fault (timeout/eof), deliberately not
    /// a flash error: the load succeeded, protocol sync failed downstream.
    pub fn wait_prompt(&self, dut: &mut dyn Channel) -> Result<String, ChannelError> {
        dut.expect(&self.prompt, self.prompt_timeout)
    }
}
