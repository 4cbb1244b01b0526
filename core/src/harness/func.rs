//! Terminal harness wrapping an arbitrary user test function.
//!
//! This is the componentized fault boundary for user code: whatever the
//! function raises is mapped into the failure taxonomy here, and everything
//! it writes through its context is attached to the result, on the passing
//! and the failing branch alike.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::Result;

use super::{Harness, panic_message};
use crate::device::Channel;
use crate::types::{FailureKind, TestResult};

/// Execution context handed to a user test function.
///
/// Implements [`fmt::Write`], so `writeln!(ctx, ...)` is the idiomatic way
/// for a test to produce output; the harness captures it into the result.
pub struct TestContext<'a> {
    pub dut: &'a mut dyn Channel,
    out: String,
}

impl<'a> TestContext<'a> {
    fn new(dut: &'a mut dyn Channel) -> Self {
        Self {
            dut,
            out: String::new(),
        }
    }

    /// Text the test has written so far.
    pub fn output(&self) -> &str {
        &self.out
    }
}

impl fmt::Write for TestContext<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.out.push_str(s);
        Ok(())
    }
}

type TestFn = Box<dyn FnMut(&mut TestContext) -> Result<Option<TestResult>>>;

/// The terminal stage of a harness chain.
///
/// The wrapped function may return `Ok(None)`, which defaults to a passing
/// result — running to completion without a raised fault counts as success.
pub struct FuncHarness {
    func: TestFn,
}

impl FuncHarness {
    pub fn new(func: impl FnMut(&mut TestContext) -> Result<Option<TestResult>> + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }
}

impl Harness for FuncHarness {
    fn run(&mut self, dut: &mut dyn Channel) -> Result<Option<TestResult>> {
        let mut ctx = TestContext::new(dut);
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)(&mut ctx)));
        let output = ctx.out;
        let result = match outcome {
            Ok(Ok(None)) => TestResult::pass(),
            Ok(Ok(Some(result))) => result,
            Ok(Err(e)) => TestResult::from_error(&e),
            Err(payload) => TestResult::fail(
                FailureKind::Unknown,
                format!("test function panicked: {}", panic_message(payload.as_ref())),
            ),
        };
        Ok(Some(result.with_output(output)))
    }

    fn terminal(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "user-function"
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;
    use std::time::Duration;

    use super::*;
    use crate::device::testchannel::ScriptedChannel;
    use crate::types::{AssertionFailed, TestStatus, check};

    const T: Duration = Duration::from_millis(10);

    fn run(harness: &mut FuncHarness, chan: &mut ScriptedChannel) -> TestResult {
        harness.run(chan).unwrap().unwrap()
    }

    #[test]
    fn returning_none_defaults_to_pass() {
        let mut harness = FuncHarness::new(|_ctx| Ok(None));
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.status, TestStatus::Pass);
        assert_eq!(result.kind, None);
    }

    #[test]
    fn returned_result_is_passed_through() {
        let mut harness = FuncHarness::new(|_ctx| {
            Ok(Some(TestResult::fail(
                FailureKind::Assertion,
                "version string missing",
            )))
        });
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Assertion));
    }

    #[test]
    fn expect_timeout_maps_to_expect_timeout() {
        let mut harness = FuncHarness::new(|ctx| {
            ctx.dut.expect("# ", T)?;
            Ok(None)
        });
        let mut chan = ScriptedChannel::new();
        chan.feed("half a prompt");
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.status, TestStatus::Fail);
        assert_eq!(result.kind, Some(FailureKind::ExpectTimeout));
        assert!(result.message.unwrap().contains("# "));
    }

    #[test]
    fn eof_maps_to_eof() {
        let mut harness = FuncHarness::new(|ctx| {
            ctx.dut.expect("# ", T)?;
            Ok(None)
        });
        let mut chan = ScriptedChannel::new();
        chan.close();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Eof));
    }

    #[test]
    fn decode_fault_maps_to_decode() {
        let mut harness = FuncHarness::new(|ctx| {
            ctx.dut.expect("# ", T)?;
            Ok(None)
        });
        let mut chan = ScriptedChannel::new();
        chan.feed_raw(b"\xff\xff");
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Decode));
    }

    #[test]
    fn assertion_fault_maps_to_assertion() {
        let mut harness = FuncHarness::new(|_ctx| {
            check(1 + 1 == 3, "arithmetic is broken")?;
            Ok(None)
        });
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Assertion));
        assert!(result.message.unwrap().contains("arithmetic is broken"));
    }

    #[test]
    fn other_errors_map_to_unknown() {
        let mut harness = FuncHarness::new(|_ctx| Err(anyhow::anyhow!("fixture fell over")));
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Unknown));
    }

    #[test]
    fn panic_maps_to_unknown() {
        let mut harness = FuncHarness::new(|_ctx| panic!("out of ideas"));
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.kind, Some(FailureKind::Unknown));
        assert!(result.message.unwrap().contains("out of ideas"));
    }

    #[test]
    fn output_is_captured_on_pass() {
        let mut harness = FuncHarness::new(|ctx| {
            writeln!(ctx, "probing device")?;
            writeln!(ctx, "done")?;
            Ok(None)
        });
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert!(result.passed());
        assert_eq!(result.output.as_deref(), Some("probing device\ndone\n"));
    }

    #[test]
    fn output_is_captured_on_failure() {
        let mut harness = FuncHarness::new(|ctx| {
            writeln!(ctx, "about to check the impossible")?;
            Err(AssertionFailed("it was impossible".into()).into())
        });
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert!(result.failed());
        assert_eq!(
            result.output.as_deref(),
            Some("about to check the impossible\n")
        );
    }

    #[test]
    fn output_survives_a_panicking_test() {
        let mut harness = FuncHarness::new(|ctx| {
            writeln!(ctx, "last words").unwrap();
            panic!("gone");
        });
        let mut chan = ScriptedChannel::new();
        let result = run(&mut harness, &mut chan);
        assert_eq!(result.output.as_deref(), Some("last words\n"));
    }
}
