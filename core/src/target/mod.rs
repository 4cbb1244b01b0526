//! Declarative target registry and per-test chain assembly.
//!
//! Board variants are configuration, not class hierarchies: a
//! [`TargetConfig`] holds the constants a concrete board needs and
//! [`Target`] wires them to the shared collaborators.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use log::*;

use crate::boot::image::{CleanmarkerSpec, ImageProperty};
use crate::boot::loader::ImageLoader;
use crate::boot::rebooter::Rebooter;
use crate::device::Channel;
use crate::harness::reboot::RebooterHarness;
use crate::harness::shell::ShellHarness;
use crate::harness::{ConfigError, HarnessBuilder, HarnessChain};
use crate::host::Host;
use crate::types::{TestOptions, TestResult};

/// Constants for one concrete board class.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub name: &'static str,
    /// Regex for the target OS shell prompt.
    pub shell_prompt: &'static str,
    /// Regex for the boot-stage firmware prompt.
    pub boot_prompt: &'static str,
    pub baudrate: u32,
    pub image: ImageProperty,
    /// Boot strap wired active low on this board family.
    pub strap_active_low: bool,
}

/// Known board classes.
pub fn builtin(name: &str) -> Option<TargetConfig> {
    [zynq7000_zedboard()].into_iter().find(|t| t.name == name)
}

pub fn builtin_names() -> Vec<&'static str> {
    vec![zynq7000_zedboard().name]
}

/// Zynq-7000 Zedboard class: system image on flash0, served over USB.
pub fn zynq7000_zedboard() -> TargetConfig {
    TargetConfig {
        name: "zynq7000-zedboard",
        shell_prompt: "# ",
        boot_prompt: "boot> ",
        baudrate: 115_200,
        image: ImageProperty {
            file: "system.disk".into(),
            source: "usb0".into(),
            memory_bank: "flash0".into(),
            device_id: "2.0".into(),
            cleanmarkers: CleanmarkerSpec {
                start_block: 0x80,
                block_count: 0x100,
                block_size: 0x1_0000,
                marker_size: 0x10,
            },
            timeout_secs: 140,
        },
        strap_active_low: true,
    }
}

/// One device under test: its channel, its rebooter, its configuration.
pub struct Target {
    cfg: TargetConfig,
    dut: Box<dyn Channel>,
    rebooter: Rc<RefCell<Rebooter>>,
}

impl Target {
    pub fn new(cfg: TargetConfig, host: Rc<RefCell<dyn Host>>, dut: Box<dyn Channel>) -> Self {
        let mut rebooter = Rebooter::new(host);
        if cfg.strap_active_low {
            rebooter = rebooter.with_active_low_strap();
        }
        Self {
            cfg,
            dut,
            rebooter: Rc::new(RefCell::new(rebooter)),
        }
    }

    pub fn config(&self) -> &TargetConfig {
        &self.cfg
    }

    pub fn rebooter(&self) -> Rc<RefCell<Rebooter>> {
        self.rebooter.clone()
    }

    pub fn dut(&mut self) -> &mut dyn Channel {
        self.dut.as_mut()
    }

    /// Assemble the harness chain for one test definition:
    /// optional reboot, optional shell command, then the terminal stage.
    pub fn build_test(&self, options: TestOptions) -> Result<HarnessChain, ConfigError> {
        let mut builder = HarnessBuilder::new();
        if options.reboot {
            builder.add(RebooterHarness::new(self.rebooter.clone()));
        }
        if let Some(shell) = options.shell {
            builder.add(ShellHarness::new(shell.cmd, self.cfg.shell_prompt));
        }
        builder.add(options.harness);
        builder.build()
    }

    /// Build and run one test, reducing it to a result.
    pub fn run_test(&mut self, options: TestOptions) -> Result<TestResult, ConfigError> {
        let mut chain = self.build_test(options)?;
        debug!("chain for {}: {:?}", self.cfg.name, chain.stage_names());
        Ok(chain.run(self.dut.as_mut()))
    }

    /// Re-flash the device through the given pipeline.
    pub fn flash(&mut self, loader: &mut ImageLoader) -> Result<()> {
        info!("flashing {}", self.cfg.name);
        loader.load(self.dut.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;
    use std::time::Duration;

    use super::*;
    use crate::device::testchannel::ScriptedChannel;
    use crate::harness::func::FuncHarness;
    use crate::host::testhost::TestHost;
    use crate::types::{FailureKind, ShellCommand, check};

    fn test_target(dut: ScriptedChannel) -> Target {
        let host: Rc<RefCell<dyn Host>> = Rc::new(RefCell::new(TestHost::new()));
        Target::new(zynq7000_zedboard(), host, Box::new(dut))
    }

    #[test]
    fn registry_resolves_known_names() {
        assert!(builtin("zynq7000-zedboard").is_some());
        assert!(builtin("imaginary-board").is_none());
        assert!(builtin_names().contains(&"zynq7000-zedboard"));
    }

    #[test]
    fn chain_shape_follows_the_test_options() {
        let target = test_target(ScriptedChannel::new());
        let chain = target
            .build_test(TestOptions {
                reboot: true,
                shell: Some(ShellCommand {
                    cmd: "/bin/testsuite/runtest".into(),
                }),
                harness: FuncHarness::new(|_ctx| Ok(None)),
            })
            .unwrap();
        assert_eq!(chain.stage_names(), vec!["reboot", "shell", "user-function"]);
    }

    #[test]
    fn minimal_chain_is_just_the_terminal_stage() {
        let target = test_target(ScriptedChannel::new());
        let chain = target
            .build_test(TestOptions {
                reboot: false,
                shell: None,
                harness: FuncHarness::new(|_ctx| Ok(None)),
            })
            .unwrap();
        assert_eq!(chain.stage_names(), vec!["user-function"]);
    }

    #[test]
    fn shell_test_runs_end_to_end() {
        let mut chan = ScriptedChannel::new();
        // Shell prompt, then the suite output the terminal stage verifies.
        chan.feed("device up\n# tests: 42 passed, 0 failed\nALL TESTS PASSED\n");
        let mut target = test_target(chan);
        let result = target
            .run_test(TestOptions {
                reboot: false,
                shell: Some(ShellCommand {
                    cmd: "/bin/testsuite/runtest".into(),
                }),
                harness: FuncHarness::new(|ctx| {
                    let text = ctx.dut.expect("ALL TESTS PASSED", Duration::from_secs(1))?;
                    check(
                        !text.contains("FAILED"),
                        "suite printed a failure marker",
                    )?;
                    writeln!(ctx, "suite finished clean")?;
                    Ok(None)
                }),
            })
            .unwrap();
        assert!(result.passed(), "unexpected: {result:?}");
        assert_eq!(result.output.as_deref(), Some("suite finished clean\n"));
    }

    #[test]
    fn failing_terminal_stage_classifies() {
        let mut chan = ScriptedChannel::new();
        chan.feed("# ");
        let mut target = test_target(chan);
        let result = target
            .run_test(TestOptions {
                reboot: false,
                shell: Some(ShellCommand { cmd: "ls".into() }),
                harness: FuncHarness::new(|ctx| {
                    ctx.dut.expect("never appears", Duration::from_millis(5))?;
                    Ok(None)
                }),
            })
            .unwrap();
        assert_eq!(result.kind, Some(FailureKind::ExpectTimeout));
    }
}
