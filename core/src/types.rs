//! Test outcome type and the failure taxonomy.
//!
//! Every stage of a harness chain ultimately reduces to a [`TestResult`].
//! Faults raised by lower layers (device channel, external tools, user test
//! code) are converted exactly once, through [`TestResult::from_error`], so
//! callers never have to branch on raw error text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::ChannelError;
use crate::harness::func::FuncHarness;
use crate::tools::FlashError;

/// Verdict of a single test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TestStatus {
    #[strum(serialize = "PASS")]
    Pass,
    #[strum(serialize = "FAIL")]
    Fail,
}

/// Classification of a test failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    /// The device did not produce an expected pattern within its timeout
    ExpectTimeout,
    /// The device channel closed unexpectedly
    Eof,
    /// Received bytes could not be decoded under the configured encoding
    Decode,
    /// An explicit correctness check failed
    Assertion,
    /// Any other unanticipated fault during stage execution
    Unknown,
    /// The bootstrap/flashing pipeline failed
    Flash,
}

/// Explicit correctness-check failure inside a test stage.
///
/// Classifies as [`FailureKind::Assertion`], unlike a panic, which is an
/// unanticipated fault.
#[derive(Error, Debug, Clone)]
#[error("assertion failed: {0}")]
pub struct AssertionFailed(pub String);

/// Fail the current stage with an assertion when `cond` does not hold.
pub fn check(cond: bool, msg: impl Into<String>) -> Result<(), AssertionFailed> {
    if cond { Ok(()) } else { Err(AssertionFailed(msg.into())) }
}

/// Outcome of one test.
///
/// Invariant: `status == Pass` implies `kind == None`. The constructors
/// maintain this; prefer them over building the struct by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub kind: Option<FailureKind>,
    pub message: Option<String>,
    /// Text the test wrote through its context, or diagnostic output
    /// captured from a failing tool/channel.
    pub output: Option<String>,
}

impl TestResult {
    pub fn pass() -> Self {
        Self {
            status: TestStatus::Pass,
            kind: None,
            message: None,
            output: None,
        }
    }

    pub fn fail(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Fail,
            kind: Some(kind),
            message: Some(message.into()),
            output: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }

    pub fn failed(&self) -> bool {
        self.status == TestStatus::Fail
    }

    /// Single conversion boundary from raised faults to the taxonomy.
    ///
    /// Downcasts the typed errors the framework produces; anything
    /// unrecognized is an unanticipated fault.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(ce) = err.downcast_ref::<ChannelError>() {
            return match ce {
                ChannelError::Timeout { buffer, .. } => {
                    attach_buffer(Self::fail(FailureKind::ExpectTimeout, ce.to_string()), buffer)
                }
                ChannelError::Eof { buffer, .. } => {
                    attach_buffer(Self::fail(FailureKind::Eof, ce.to_string()), buffer)
                }
                ChannelError::Decode { .. } => Self::fail(FailureKind::Decode, ce.to_string()),
                ChannelError::Pattern { .. } => Self::fail(FailureKind::Unknown, ce.to_string()),
            };
        }
        if let Some(ae) = err.downcast_ref::<AssertionFailed>() {
            return Self::fail(FailureKind::Assertion, ae.to_string());
        }
        if let Some(fe) = err.downcast_ref::<FlashError>() {
            let result = Self::fail(FailureKind::Flash, fe.message.clone());
            return match &fe.output {
                Some(output) => result.with_output(output.clone()),
                None => result,
            };
        }
        Self::fail(FailureKind::Unknown, format!("{err:#}"))
    }
}

/// Partial device output is diagnostic gold; keep it when there is any.
fn attach_buffer(result: TestResult, buffer: &str) -> TestResult {
    if buffer.is_empty() {
        result
    } else {
        result.with_output(buffer)
    }
}

/// Immutable per-test configuration, supplied once by the test definition.
pub struct TestOptions {
    /// Power-cycle the target before the test starts.
    pub reboot: bool,
    /// Shell command to issue before the terminal stage runs.
    pub shell: Option<ShellCommand>,
    /// The terminal, user-authored stage.
    pub harness: FuncHarness,
}

/// Shell invocation spec for the pre-test shell stage
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub cmd: String,
}
