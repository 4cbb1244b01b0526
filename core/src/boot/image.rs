//! Declarative flash geometry, defined per target class.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cleanmarker layout for a flash filesystem: which erase blocks get a
/// marker and how large one is. Pure configuration, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanmarkerSpec {
    pub start_block: u32,
    pub block_count: u32,
    pub block_size: u32,
    pub marker_size: u32,
}

/// Static description of a target's boot image and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProperty {
    /// Image file name inside the boot directory.
    pub file: String,
    /// Medium the bootloader copies from, e.g. `usb0`.
    pub source: String,
    /// Destination memory bank, e.g. `flash0`.
    pub memory_bank: String,
    /// Flash device id on that bank.
    pub device_id: String,
    pub cleanmarkers: CleanmarkerSpec,
    /// Copy budget for the whole write.
    pub timeout_secs: u64,
}

impl ImageProperty {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
