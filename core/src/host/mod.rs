//! Host-side control of the target's power and boot straps.
//!
//! Implemented per physical target family; the framework only consumes this
//! contract. Failures here are fatal setup errors — nothing above retries
//! them, because no stage can proceed without power control.

use anyhow::{Result, bail};

pub mod command;
pub mod testhost;

pub trait Host {
    /// Switch target power.
    fn set_power(&mut self, on: bool) -> Result<()>;

    /// Drive the boot-strap line level. Level semantics (active high/low)
    /// are the rebooter's concern; this just sets the line.
    fn set_flash_mode(&mut self, asserted: bool) -> Result<()>;

    /// Target-specific soft reset. `Ok(false)` when the target family has
    /// no true soft reset; the rebooter then falls back to a hard cycle.
    fn soft_reset(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// Placeholder for bench setups without any host-side control hardware.
///
/// Every control request fails, so a test that needs one aborts loudly
/// instead of silently skipping the power cycle.
pub struct UnmanagedHost;

impl Host for UnmanagedHost {
    fn set_power(&mut self, on: bool) -> Result<()> {
        bail!(
            "no power control configured (cannot power {})",
            if on { "on" } else { "off" }
        );
    }

    fn set_flash_mode(&mut self, _asserted: bool) -> Result<()> {
        bail!("no boot-strap control configured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_host_refuses_control_requests() {
        let mut host = UnmanagedHost;
        assert!(host.set_power(true).is_err());
        assert!(host.set_flash_mode(true).is_err());
        assert!(!host.soft_reset().unwrap());
    }
}
