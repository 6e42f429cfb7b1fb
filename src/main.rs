//! atterm - interactive AT-command terminal for serial devices
//!
//! Main entry point. One binary, two modes:
//!
//! - **UI mode** (default): Slint window, tokio runtime for the bridge and the
//!   worker supervision, and a Serial Worker behind an isolation boundary.
//! - **Worker mode** (`atterm worker ...`, hidden): hosts the Serial Worker in
//!   its own OS process. Spawned by the UI mode; talks frames over stdin/stdout.
//!
//! # Execution Flow (UI mode)
//!
//! 1. Initialize logging -> logs/atterm.<date>
//! 2. Load `atterm.yaml` (defaults, file, `ATTERM_*` env) and apply CLI overrides
//! 3. Create the tokio runtime
//! 4. Create GuiController (starts the worker and the bridge)
//! 5. Run the Slint event loop until the user quits
//! 6. Shutdown the tokio runtime

use anyhow::{Context, Result};
use atterm::logging::{self, UI_LOG_PREFIX, WORKER_LOG_PREFIX};
use atterm::models::{ConnectionConfig, Isolation};
use atterm::services::{SerialPortOpener, WorkerCommand, WorkerLauncher, serve_stdio};
use atterm::ui::GuiController;
use atterm::{APP_NAME, ConfigManager, VERSION};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "atterm", version, about = "Interactive AT-command terminal for serial devices")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Serial device, e.g. /dev/ttyUSB0 or COM3 (overrides atterm.yaml)
    device: Option<String>,

    /// Baud rate (overrides atterm.yaml)
    baud: Option<u32>,

    /// Where the serial worker runs: process or thread
    #[arg(long)]
    isolation: Option<Isolation>,

    /// Directory holding atterm.yaml
    #[arg(long, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Debug logging, also mirrored to the console
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve one serial session over stdin/stdout (spawned by the UI)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long)]
    device: String,

    #[arg(long)]
    baud: u32,

    #[arg(long, default_value_t = 100)]
    poll_timeout_ms: u64,

    #[arg(long, default_value_t = 10)]
    idle_ms: u64,

    /// File logging only; without it the worker does not log at all
    #[arg(long)]
    log_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    debug: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.mode {
        Some(Mode::Worker(args)) => Ok(run_worker(args)),
        None => run_ui(cli).map(|()| ExitCode::SUCCESS),
    }
}

/// Worker mode. Stdout belongs to the frame protocol, so errors go to the
/// log file (or stderr) only.
fn run_worker(args: WorkerArgs) -> ExitCode {
    let _guard = match &args.log_dir {
        Some(dir) => match logging::setup_logging(dir, WORKER_LOG_PREFIX, args.debug) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("atterm worker: logging disabled: {:#}", e);
                None
            }
        },
        None => None,
    };

    if args.baud == 0 || args.poll_timeout_ms == 0 || args.idle_ms == 0 {
        tracing::error!("Invalid worker arguments: {:?}", args);
        eprintln!("atterm worker: baud rate, poll timeout and idle interval must be greater than zero");
        return ExitCode::FAILURE;
    }

    let config = ConnectionConfig::new(args.device, args.baud)
        .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms));

    let code = serve_stdio(config, Duration::from_millis(args.idle_ms));
    tracing::info!("Worker process exiting");
    code
}

fn run_ui(cli: Cli) -> Result<()> {
    // Hold the guard until the very end so buffered log lines are flushed
    let _guard = logging::setup_logging_with_console(&cli.log_dir, UI_LOG_PREFIX, cli.debug, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    if config_manager.ensure_user_config()? {
        tracing::info!("Created {}", config_manager.user_config_path());
    }

    let user_config = config_manager
        .load_user_config()?
        .with_overrides(cli.device, cli.baud, cli.isolation);
    let connection = user_config
        .connection_config()
        .context("Invalid connection or session settings")?;
    let debug = cli.debug || user_config.session.debug_mode;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("atterm-io")
        .build()
        .context("Failed to create tokio runtime")?;

    let launcher = match user_config.session.isolation {
        Isolation::Process => {
            let log_dir = cli
                .log_dir
                .canonicalize_utf8()
                .unwrap_or_else(|_| cli.log_dir.clone());
            WorkerLauncher::Process(
                WorkerCommand::current_exe()?
                    .with_log_dir(log_dir)
                    .with_debug(debug),
            )
        }
        Isolation::Thread => WorkerLauncher::Thread(Box::new(SerialPortOpener)),
    };

    tracing::info!(
        "Connecting to {} @ {} ({} isolation)",
        connection.device,
        connection.baud_rate,
        user_config.session.isolation
    );

    let gui_controller =
        GuiController::new(&user_config.session, connection, launcher, runtime.handle().clone())?;
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");
    runtime.shutdown_timeout(Duration::from_secs(2));
    tracing::info!("Application shutdown complete");

    result.inspect_err(|e| tracing::error!("GUI error: {:#}", e))
}
