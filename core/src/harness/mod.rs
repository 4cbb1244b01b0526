//! Composable execution stages and the chain that runs them.
//!
//! A test is an ordered chain of [`Harness`] stages over one shared device
//! channel. Intermediate stages (reboot, shell command, image flashing) act
//! and delegate; the single terminal stage produces the final result. The
//! chain is the outermost fault boundary: whatever a stage raises,
//! [`HarnessChain::run`] reduces it to a classified [`TestResult`].

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;
use log::*;
use thiserror::Error;

use crate::device::Channel;
use crate::types::{FailureKind, TestResult};

pub mod func;
pub mod reboot;
pub mod shell;

/// Defects in the wiring of a test definition.
///
/// These abort loudly instead of becoming a [`TestResult`]: a malformed
/// chain is a bug in the test setup, not a flaky device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("harness chain is empty")]
    Empty,
    #[error("harness chain has no terminal stage")]
    MissingTerminal,
    #[error("terminal stage `{name}` at position {index} must be the last of {len} stages")]
    TerminalNotLast {
        name: &'static str,
        index: usize,
        len: usize,
    },
}

/// One execution stage of a test.
pub trait Harness {
    /// Perform this stage's action.
    ///
    /// Non-terminal stages return `Ok(None)` to delegate to the next stage;
    /// the terminal stage returns `Ok(Some(result))`. Errors are converted
    /// by the chain, so thin stages need no fault-mapping of their own.
    fn run(&mut self, dut: &mut dyn Channel) -> Result<Option<TestResult>>;

    /// Terminal stages end the chain and must be added last.
    fn terminal(&self) -> bool {
        false
    }

    /// Stage name for logs and configuration errors.
    fn name(&self) -> &'static str;
}

/// Builds a [`HarnessChain`], validating its shape on finalization.
///
/// Validation is deliberately lazy: `add` never fails, so construction
/// order does not matter until [`HarnessBuilder::build`].
pub struct HarnessBuilder {
    stages: Vec<Box<dyn Harness>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn add(&mut self, harness: impl Harness + 'static) {
        self.stages.push(Box::new(harness));
    }

    /// Enforces: at least one stage, exactly one terminal stage, terminal
    /// stage last.
    pub fn build(self) -> Result<HarnessChain, ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Empty);
        }
        let len = self.stages.len();
        match self.stages.iter().position(|s| s.terminal()) {
            None => Err(ConfigError::MissingTerminal),
            Some(index) if index + 1 != len => Err(ConfigError::TerminalNotLast {
                name: self.stages[index].name(),
                index,
                len,
            }),
            Some(_) => Ok(HarnessChain {
                stages: self.stages,
            }),
        }
    }
}

/// An ordered, validated sequence of harness stages.
pub struct HarnessChain {
    stages: Vec<Box<dyn Harness>>,
}

impl HarnessChain {
    /// Run every stage in order, short-circuiting on the first non-passing
    /// result.
    ///
    /// Guaranteed to produce a `TestResult`: stage errors go through the
    /// taxonomy and panics are caught here, at the outermost boundary.
    pub fn run(&mut self, dut: &mut dyn Channel) -> TestResult {
        let mut last = None;
        for stage in &mut self.stages {
            debug!("running stage `{}`", stage.name());
            match catch_unwind(AssertUnwindSafe(|| stage.run(&mut *dut))) {
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!("stage `{}` panicked: {msg}", stage.name());
                    return TestResult::fail(
                        FailureKind::Unknown,
                        format!("stage `{}` panicked: {msg}", stage.name()),
                    );
                }
                Ok(Err(e)) => {
                    debug!("stage `{}` raised: {e:#}", stage.name());
                    return TestResult::from_error(&e);
                }
                Ok(Ok(Some(result))) if result.failed() => return result,
                Ok(Ok(Some(result))) => last = Some(result),
                Ok(Ok(None)) => (),
            }
        }
        last.unwrap_or_else(TestResult::pass)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for HarnessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
