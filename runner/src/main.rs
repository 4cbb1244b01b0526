use std::cell::RefCell;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use log::*;

use testrig_core::boot::bootloader::Bootloader;
use testrig_core::boot::loader::ImageLoader;
use testrig_core::device::serial::SerialChannel;
use testrig_core::harness::func::FuncHarness;
use testrig_core::host::command::CommandHost;
use testrig_core::host::{Host, UnmanagedHost};
use testrig_core::target::{self, Target};
use testrig_core::tools::flashtool::FlashTool;
use testrig_core::tools::gdb::{GdbScriptLoader, GdbServer};
use testrig_core::tools::imageserver::ImageServer;
use testrig_core::types::{ShellCommand, TestOptions};
use testrig_runner::{FlashSpec, Suite, SuiteTest, TestReport, TestReportEntry};

#[derive(Parser)]
struct Args {
    /// Suite file (JSON)
    suite: PathBuf,

    /// Serial port of the device under test
    #[arg(short, long)]
    port: String,

    /// Target class to run against
    #[arg(short, long, default_value = "zynq7000-zedboard")]
    target: String,

    /// Override the target's default baudrate
    #[arg(long)]
    baudrate: Option<u32>,

    /// Directory for report.json
    #[arg(short, long, default_value = "out")]
    output_dir: PathBuf,

    /// Run the tests without re-imaging, even if the suite has a flash
    /// section
    #[arg(long)]
    skip_flash: bool,
}

fn flash_target(target: &mut Target, spec: &FlashSpec) -> Result<()> {
    let mut gdb = GdbScriptLoader::new(GdbServer::new(&spec.gdb_device), &spec.elf, &spec.script);
    let mut flash_tool = FlashTool::new(&spec.flash_tool);
    if let Some(boot_dir) = &spec.boot_dir {
        gdb = gdb.with_cwd(boot_dir);
        flash_tool = flash_tool.with_cwd(boot_dir);
    }
    let mut loader = ImageLoader::new(
        target.rebooter(),
        Bootloader::new(target.config().boot_prompt),
        gdb,
        flash_tool,
        target.config().image.clone(),
    );
    if let Some(server) = &spec.image_server {
        let boot_dir = spec.boot_dir.clone().unwrap_or_else(|| ".".into());
        loader = loader.with_image_server(ImageServer::new(server, boot_dir));
    }
    target.flash(&mut loader)
}

fn build_options(test: &SuiteTest) -> TestOptions {
    let expect = test.expect.clone();
    let timeout = Duration::from_secs(test.timeout_secs);
    TestOptions {
        reboot: test.reboot,
        shell: test.shell.clone().map(|cmd| ShellCommand { cmd }),
        harness: FuncHarness::new(move |ctx| {
            if let Some(pattern) = &expect {
                let text = ctx.dut.expect(pattern, timeout)?;
                writeln!(ctx, "{}", text.trim_end())?;
            }
            Ok(None)
        }),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    let Some(mut cfg) = target::builtin(&args.target) else {
        bail!(
            "unknown target `{}`; known targets: {}",
            args.target,
            target::builtin_names().join(", ")
        );
    };
    if let Some(baudrate) = args.baudrate {
        cfg.baudrate = baudrate;
    }

    let suite: Suite = serde_json::from_reader(
        File::open(&args.suite)
            .with_context(|| format!("opening suite {}", args.suite.display()))?,
    )
    .context("parsing suite file")?;

    if suite.host.is_none() && suite.tests.iter().any(|t| t.reboot) {
        bail!("suite requests reboots but configures no host control commands");
    }
    let host: Rc<RefCell<dyn Host>> = match suite.host.clone() {
        Some(commands) => Rc::new(RefCell::new(CommandHost::new(commands))),
        None => Rc::new(RefCell::new(UnmanagedHost)),
    };

    let dut = SerialChannel::open(&args.port, cfg.baudrate)?;
    let mut target = Target::new(cfg, host, Box::new(dut));

    match &suite.flash {
        Some(spec) if !args.skip_flash => {
            flash_target(&mut target, spec).context("flashing the target")?;
        }
        Some(_) => info!("skipping flash phase"),
        None => (),
    }

    let mut report = TestReport {
        started: Utc::now().to_rfc3339(),
        tests: Vec::new(),
    };

    info!(
        "running {} tests against {} on {}",
        suite.tests.len(),
        target.config().name,
        args.port
    );
    let suite_start = Instant::now();
    for test in &suite.tests {
        info!("=== {} ===", test.name);
        let start = Instant::now();
        let result = target
            .run_test(build_options(test))
            .with_context(|| format!("test `{}` is miswired", test.name))?;
        let duration = start.elapsed().as_secs_f64();
        match result.kind {
            None => info!("{}: {} ({duration:.2}s)", test.name, result.status),
            Some(kind) => warn!(
                "{}: {} [{kind}] {} ({duration:.2}s)",
                test.name,
                result.status,
                result.message.as_deref().unwrap_or(""),
            ),
        }
        report.tests.push(TestReportEntry {
            name: test.name.clone(),
            target: target.config().name.to_string(),
            duration_secs: duration,
            result,
        });
    }

    fs::create_dir_all(&args.output_dir)?;
    let report_path = args.output_dir.join("report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    info!(
        "{}/{} tests passed in {:.1}s, report written to {}",
        report.tests.len() - report.failed(),
        report.tests.len(),
        suite_start.elapsed().as_secs_f64(),
        report_path.display()
    );

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
