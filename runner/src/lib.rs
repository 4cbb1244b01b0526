//! Suite and report formats for the test runner.

use serde::{Deserialize, Serialize};

use testrig_core::host::command::HostCommands;
use testrig_core::types::TestResult;

/// One executed test in a report
#[derive(Serialize, Deserialize, Debug)]
pub struct TestReportEntry {
    pub name: String,
    pub target: String,
    pub duration_secs: f64,
    pub result: TestResult,
}

/// Report for a whole suite run
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TestReport {
    /// RFC 3339 start timestamp.
    pub started: String,
    pub tests: Vec<TestReportEntry>,
}

impl TestReport {
    pub fn failed(&self) -> usize {
        self.tests.iter().filter(|t| t.result.failed()).count()
    }
}

/// One test definition in a suite file
#[derive(Deserialize, Debug)]
pub struct SuiteTest {
    pub name: String,
    /// Power-cycle the target first.
    #[serde(default)]
    pub reboot: bool,
    /// Shell command to issue before the check.
    #[serde(default)]
    pub shell: Option<String>,
    /// Regex the device output must produce.
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Flashing setup for suites that re-image the target first
#[derive(Deserialize, Debug, Clone)]
pub struct FlashSpec {
    /// Boot-stage ELF handed to the GDB batch loader.
    pub elf: String,
    /// GDB batch script performing the load.
    pub script: String,
    /// Device name for the debug server.
    pub gdb_device: String,
    /// External tool performing the flash write.
    pub flash_tool: String,
    /// Directory holding the boot image; loader cwd and served root.
    #[serde(default)]
    pub boot_dir: Option<String>,
    /// Daemon serving `boot_dir` over the image source medium.
    #[serde(default)]
    pub image_server: Option<String>,
}

/// Suite file: host control wiring, optional flashing, the test list
#[derive(Deserialize, Debug)]
pub struct Suite {
    /// Shell-out host control; absent on benches without power control.
    #[serde(default)]
    pub host: Option<HostCommands>,
    /// Re-image the target before running the tests.
    #[serde(default)]
    pub flash: Option<FlashSpec>,
    pub tests: Vec<SuiteTest>,
}
