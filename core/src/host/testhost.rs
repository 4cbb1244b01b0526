//! Recording host double for tests.

use anyhow::{Result, bail};

use super::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Power(bool),
    FlashMode(bool),
    SoftReset,
}

/// Test double for [`Host`] that records every control transition.
#[derive(Default)]
pub struct TestHost {
    pub events: Vec<HostEvent>,
    /// Pretend the target family has a soft reset.
    pub soft_reset_supported: bool,
    /// Make power control fail, for fatal-setup-error paths.
    pub fail_power: bool,
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last strap level that was driven, if any.
    pub fn strap_level(&self) -> Option<bool> {
        self.events.iter().rev().find_map(|e| match e {
            HostEvent::FlashMode(level) => Some(*level),
            _ => None,
        })
    }
}

impl Host for TestHost {
    fn set_power(&mut self, on: bool) -> Result<()> {
        if self.fail_power {
            bail!("power relay unreachable");
        }
        self.events.push(HostEvent::Power(on));
        Ok(())
    }

    fn set_flash_mode(&mut self, asserted: bool) -> Result<()> {
        self.events.push(HostEvent::FlashMode(asserted));
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<bool> {
        if self.soft_reset_supported {
            self.events.push(HostEvent::SoftReset);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
