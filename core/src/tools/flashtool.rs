//! External flash-write tool invocation.

use std::path::PathBuf;
use std::process::Command;

use log::*;

use super::{FlashError, run_with_timeout};
use crate::boot::image::ImageProperty;

/// Opaque external tool that performs the actual flash write,
/// parameterized by the declarative image geometry.
pub struct FlashTool {
    pub program: String,
    pub cwd: Option<PathBuf>,
}

impl FlashTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cwd: None,
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Write `image` to the target. Bounded by the image's copy budget;
    /// non-zero exit and timeout are flash errors with the tool's output.
    pub fn flash(&self, image: &ImageProperty) -> Result<(), FlashError> {
        let marks = &image.cleanmarkers;
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--file",
            image.file.as_str(),
            "--source",
            image.source.as_str(),
            "--bank",
            image.memory_bank.as_str(),
            "--device",
            image.device_id.as_str(),
        ]);
        cmd.args([
            "--start-block".to_string(),
            format!("{:#x}", marks.start_block),
            "--blocks".to_string(),
            format!("{:#x}", marks.block_count),
            "--block-size".to_string(),
            format!("{:#x}", marks.block_size),
            "--cleanmarker-size".to_string(),
            format!("{:#x}", marks.marker_size),
        ]);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        info!(
            "flashing {} to {} via {}",
            image.file, image.memory_bank, self.program
        );

        let out = run_with_timeout(cmd, image.timeout())
            .map_err(|e| FlashError::new(format!("{}: {e}", self.program)))?;
        if out.timed_out {
            return Err(FlashError::with_output(
                format!("flash tool timed out after {:?}", image.timeout()),
                out.output,
            ));
        }
        if !out.success() {
            return Err(FlashError::with_output(
                format!("flash tool exited with status {:?}", out.status),
                out.output,
            ));
        }
        debug!("flash write finished");
        Ok(())
    }
}
