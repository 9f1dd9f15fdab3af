//! kubectl-tunnel - Run kubectl through an SSH tunnel
//!
//! Opens an `ssh -L` forward to the active cluster's API server, writes a
//! temporary kubeconfig pointing at it and runs kubectl with the trailing
//! arguments. Without arguments the tunnel stays open until Ctrl+C.

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use kubetunnel_core::kubeconfig::locate_kubeconfig;
use kubetunnel_core::{Orchestrator, RawConfig, SignalRelay};
use tracing::{debug, error, warn};

#[derive(Parser, Debug)]
#[command(name = "kubectl-tunnel")]
#[command(author, version, about = "Run kubectl through an SSH tunnel to the cluster API server")]
pub(crate) struct Cli {
    /// Path to the kubeconfig file (defaults to $KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// SSH login user
    #[arg(long)]
    ssh_user: Option<String>,

    /// SSH host (defaults to the API server host)
    #[arg(long)]
    ssh_host: Option<String>,

    /// SSH port
    #[arg(long)]
    ssh_port: Option<u16>,

    /// SSH private key
    #[arg(short, long)]
    identity_file: Option<PathBuf>,

    /// ssh binary to run
    #[arg(long)]
    ssh_binary: Option<PathBuf>,

    /// kubectl binary to run
    #[arg(long)]
    kubectl: Option<PathBuf>,

    /// Wait this long for the tunnel to settle, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Poll the local port until the tunnel accepts connections
    #[arg(long)]
    probe: bool,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    show_settings: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Arguments passed to kubectl
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("{:#}", e);
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(process_exit_code(code)),
        Err(e) => {
            error!("Error executing command: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = settings::effective(&cli).await?;
    debug!(settings = ?settings, "Loaded settings");

    if cli.show_settings {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(0);
    }

    let path = locate_kubeconfig(cli.kubeconfig.clone()).context("Error loading kubeconfig")?;
    let raw = RawConfig::load(&path)
        .await
        .context("Error loading kubeconfig")?;

    let orchestrator = Orchestrator::new(settings.tunnel_options(), settings.supervisor_options())
        .on_ready(|info| {
            if info.idle {
                println!(
                    "Tunnel open on localhost:{} -> {}. Press Ctrl+C to exit.",
                    info.local_port, info.endpoint
                );
                println!("Use: export KUBECONFIG={}", info.config_path.display());
            }
        });

    let mut relay = SignalRelay::os().context("Error installing signal handlers")?;
    let report = orchestrator.run(&raw, &cli.args, &mut relay).await?;
    drop(relay);

    for e in &report.cleanup_errors {
        warn!(error = %e, "Cleanup incomplete");
    }

    Ok(report.exit_code)
}

/// Maps the wrapped command's exit code to the process exit code.
///
/// Codes outside `0..=255` (such as negative NTSTATUS values on Windows)
/// become 1 rather than being truncated.
fn process_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so kubectl's stdout stays clean.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
