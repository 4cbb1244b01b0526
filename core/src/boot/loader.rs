//! Bootloader entry and image-flashing pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use log::*;

use super::bootloader::Bootloader;
use super::image::ImageProperty;
use super::rebooter::Rebooter;
use crate::device::Channel;
use crate::harness::Harness;
use crate::tools::flashtool::FlashTool;
use crate::tools::gdb::GdbScriptLoader;
use crate::tools::imageserver::ImageServer;
use crate::types::TestResult;

/// Multi-step pipeline that brings the target into its bootloader and
/// writes a fresh system image.
///
/// Every external step is time-bounded and maps to one stable error kind;
/// flash mode is restored on every exit path. Harness-compatible, so it
/// composes with user-defined stages in a chain.
pub struct ImageLoader {
    rebooter: Rc<RefCell<Rebooter>>,
    bootloader: Bootloader,
    loader: GdbScriptLoader,
    flash_tool: FlashTool,
    server: Option<ImageServer>,
    image: ImageProperty,
}

impl ImageLoader {
    pub fn new(
        rebooter: Rc<RefCell<Rebooter>>,
        bootloader: Bootloader,
        loader: GdbScriptLoader,
        flash_tool: FlashTool,
        image: ImageProperty,
    ) -> Self {
        Self {
            rebooter,
            bootloader,
            loader,
            flash_tool,
            server: None,
            image,
        }
    }

    /// Serve the boot directory while the flash tool drives the copy.
    #[must_use]
    pub fn with_image_server(mut self, server: ImageServer) -> Self {
        self.server = Some(server);
        self
    }

    /// Run the full pipeline.
    pub fn load(&mut self, dut: &mut dyn Channel) -> Result<()> {
        self.rebooter.borrow_mut().set_flash_mode(true)?;
        let outcome = self.run_steps(dut);
        // Restore regardless of how the steps went; a restore failure is a
        // host fault and surfaces unless the steps already failed.
        let restored = self.rebooter.borrow_mut().set_flash_mode(false);
        match (outcome, restored) {
            (Err(step_err), Err(restore_err)) => {
                warn!("could not restore flash mode: {restore_err:#}");
                Err(step_err)
            }
            (Err(step_err), Ok(())) => Err(step_err),
            (Ok(()), restored) => restored,
        }
    }

    fn run_steps(&mut self, dut: &mut dyn Channel) -> Result<()> {
        self.rebooter.borrow_mut().reboot(dut, false)?;
        self.loader.load()?;
        self.bootloader.enter(dut)?;
        self.bootloader.wait_prompt(dut)?;
        let _server = match &self.server {
            Some(server) => Some(server.start()?),
            None => None,
        };
        self.flash_tool.flash(&self.image)?;
        info!("image {} flashed", self.image.file);
        Ok(())
    }
}

impl Harness for ImageLoader {
    fn run(&mut self, dut: &mut dyn Channel) -> Result<Option<TestResult>> {
        self.load(dut)?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "image-loader"
    }
}
