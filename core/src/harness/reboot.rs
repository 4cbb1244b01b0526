//! Power-cycle stage.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use super::Harness;
use crate::boot::rebooter::Rebooter;
use crate::device::Channel;
use crate::types::TestResult;

/// Non-terminal stage that power-cycles the target before the test proper.
pub struct RebooterHarness {
    rebooter: Rc<RefCell<Rebooter>>,
    soft: bool,
}

impl RebooterHarness {
    /// Hard reboot by default; see [`RebooterHarness::soft`].
    pub fn new(rebooter: Rc<RefCell<Rebooter>>) -> Self {
        Self {
            rebooter,
            soft: false,
        }
    }

    /// Prefer the target's soft reset, falling back to a hard cycle when
    /// the host does not support one.
    #[must_use]
    pub fn soft(mut self) -> Self {
        self.soft = true;
        self
    }
}

impl Harness for RebooterHarness {
    fn run(&mut self, dut: &mut dyn Channel) -> Result<Option<TestResult>> {
        self.rebooter.borrow_mut().reboot(dut, self.soft)?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "reboot"
    }
}
