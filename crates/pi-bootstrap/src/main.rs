//! Raspberry Pi cluster bootstrap CLI.
//!
//! Brings a single Pi from a fresh OS to K3s running Argo CD with the root
//! application applied, tears it down again, or reports where it stands.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pi_bootstrap::{ui, BootstrapError};

mod commands;

use commands::down::DownCommand;
use commands::status::StatusCommand;
use commands::up::UpCommand;
use commands::GlobalOptions;

/// Exit code for errors that are not a [`BootstrapError`].
const EXIT_UNEXPECTED: u8 = 4;
/// Exit code for usage errors.
const EXIT_USAGE: u8 = 1;

/// Raspberry Pi bootstrap: K3s + Argo CD on one node.
#[derive(Parser)]
#[command(
    name = "pi-bootstrap",
    version,
    about = "Idempotent K3s + Argo CD bootstrap for a Raspberry Pi",
    long_about = "Bring a Raspberry Pi from a fresh OS to a running K3s cluster managed by Argo CD.\n\n\
                  Steps: mount storage, install K3s, wait for the node, install Argo CD,\n\
                  wait for it, apply the root application.\n\n\
                  Every step is idempotent - re-running skips what is already in place."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE", env = "PI_BOOTSTRAP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print a machine-readable summary instead of the console report.
    #[arg(long, global = true)]
    json: bool,

    /// Readiness ceiling per step, in seconds.
    #[arg(long, global = true, env = "PI_BOOTSTRAP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Readiness poll interval, in seconds.
    #[arg(long, global = true, env = "PI_BOOTSTRAP_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the host (default).
    Up(UpCommand),

    /// Remove the root application, Argo CD and K3s, and unmount storage.
    Down(DownCommand),

    /// Show which steps are already satisfied without changing anything.
    Status(StatusCommand),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "info,pi_bootstrap=debug"
    } else {
        "warn,pi_bootstrap=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<BootstrapError>()
        .map_or(EXIT_UNEXPECTED, BootstrapError::exit_code)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose, cli.log_format);

    let cancel = CancellationToken::new();
    let listener = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current action");
            listener.cancel();
        }
    });

    let opts = GlobalOptions {
        config: cli.config,
        json: cli.json,
        timeout_secs: cli.timeout_secs,
        poll_interval_secs: cli.poll_interval_secs,
        cancel,
    };

    let outcome = match cli.command.unwrap_or_else(|| Commands::Up(UpCommand::default())) {
        Commands::Up(cmd) => cmd.run(&opts).await,
        Commands::Down(cmd) => cmd.run(&opts).await,
        Commands::Status(cmd) => cmd.run(&opts).await,
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            ui::print_error(&format!("{err:#}"));
            ExitCode::from(exit_code_for(&err))
        }
    }
}
