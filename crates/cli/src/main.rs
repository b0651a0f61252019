//! kubesleep CLI
//!
//! Suspends Kubernetes namespaces by scaling their Deployments, StatefulSets
//! and CronJobs down to zero, and wakes them back up to the recorded scale.

mod client;
mod commands;
mod config;
mod output;
mod version;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use crate::config::{CliSettings, LogFormat};
use kubesleep_lib::{KubeClient, NamespaceSelection, SleepContext, SleepError, StructuredLogger};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for invariant violations, shared with clap's usage errors
const EXIT_FATAL: u8 = 2;

/// kubesleep CLI
#[derive(Parser)]
#[command(name = "kubesleep")]
#[command(
    author,
    version,
    about = "kubesleep can sleep and wake kubernetes namespaces by scaling workloads down to zero and back up",
    long_about = None
)]
pub struct Cli {
    /// Increase the log level. Can be specified multiple times
    #[arg(long, short, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to kubeconfig file (uses KUBECONFIG or ~/.kube/config if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Suspend one or multiple kubernetes namespaces
    Suspend {
        /// Kubernetes namespace. Can be specified multiple times
        #[arg(long = "namespace", short = 'n', value_name = "NAMESPACE")]
        namespaces: Vec<String>,

        /// Suspend all unprotected namespaces
        #[arg(long, conflicts_with_all = ["namespaces", "force"])]
        all_namespaces: bool,

        /// Ignore the do-not-suspend annotation on the namespace
        #[arg(long, short)]
        force: bool,
    },

    /// Wake kubernetes namespaces back up
    Wake {
        /// Kubernetes namespace. Can be specified multiple times
        #[arg(long = "namespace", short = 'n', value_name = "NAMESPACE", required = true)]
        namespaces: Vec<String>,
    },

    /// Display the suspend status of kubernetes namespaces
    Status {
        /// Kubernetes namespace. Can be specified multiple times
        #[arg(long = "namespace", short = 'n', value_name = "NAMESPACE")]
        namespaces: Vec<String>,

        /// Show every namespace
        #[arg(long, conflicts_with = "namespaces")]
        all_namespaces: bool,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (settings, settings_error) = match CliSettings::load() {
        Ok(settings) => (settings, None),
        Err(err) => (CliSettings::default(), Some(err)),
    };
    init_tracing(cli.verbose, settings.log_format);
    if let Some(err) = settings_error {
        warn!(error = %err, "Invalid KUBESLEEP_* settings, using defaults");
    }

    let update_check = spawn_update_check(&settings);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let result = run(cli, cancel).await;

    if let Some(handle) = update_check {
        if handle.is_finished() {
            if let Ok(Some(message)) = handle.await {
                println!();
                output::print_info(&message);
            }
        } else {
            handle.abort();
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{:#}", err));
            exit_code(&err)
        }
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let Cli {
        kubeconfig,
        context,
        format,
        command,
        ..
    } = cli;
    let kubeconfig = kubeconfig.as_deref();
    let context = context.as_deref();

    match command {
        Commands::Version => {
            version::write_build_info(&mut std::io::stdout())?;
        }
        Commands::Suspend {
            namespaces,
            all_namespaces,
            force,
        } => {
            let selection = NamespaceSelection::from_args(namespaces, all_namespaces, force)?;
            let (kube, ctx) = connect(kubeconfig, context, cancel).await?;
            commands::suspend::suspend(&ctx, &kube, &selection, format).await?;
        }
        Commands::Wake { namespaces } => {
            let selection = NamespaceSelection::named(namespaces, false)?;
            let (kube, ctx) = connect(kubeconfig, context, cancel).await?;
            commands::wake::wake(&ctx, &kube, &selection, format).await?;
        }
        Commands::Status {
            namespaces,
            all_namespaces,
        } => {
            let selection = NamespaceSelection::from_args(namespaces, all_namespaces, false)?;
            let (kube, ctx) = connect(kubeconfig, context, cancel).await?;
            commands::status::status(&ctx, &kube, &selection, format).await?;
        }
    }

    Ok(())
}

async fn connect(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
    cancel: CancellationToken,
) -> Result<(KubeClient, SleepContext)> {
    let client = KubeClient::connect(kubeconfig, context)
        .await
        .context("Failed to create Kubernetes client")?;

    let cluster = context
        .map(str::to_string)
        .or_else(|| current_context(kubeconfig))
        .unwrap_or_else(|| "in-cluster".to_string());
    debug!(cluster = %cluster, "Connected");

    let ctx = SleepContext::new(StructuredLogger::new(cluster)).with_cancel(cancel);
    Ok((client, ctx))
}

/// Current context of the kubeconfig in use, used to label log events
fn current_context(kubeconfig: Option<&Path>) -> Option<String> {
    let config = match kubeconfig {
        Some(path) => kube::config::Kubeconfig::read_from(path).ok()?,
        None => kube::config::Kubeconfig::read().ok()?,
    };
    config.current_context
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let default_directive = match verbosity {
        0 => "warn",
        1 => "warn,kubesleep=info,kubesleep_lib=info",
        _ => "warn,kubesleep=debug,kubesleep_lib=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Run the update check in the background. It never delays the command.
fn spawn_update_check(settings: &CliSettings) -> Option<JoinHandle<Option<String>>> {
    if !settings.update_check {
        return None;
    }
    let url = settings.release_url.clone();
    Some(tokio::spawn(async move {
        let result = match client::ReleaseClient::new(&url) {
            Ok(client) => version::check_for_update(&client, version::VERSION).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(message) => message,
            Err(err) => {
                info!(error = %err, "Update check failed");
                None
            }
        }
    }))
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    let fatal = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<SleepError>())
        .any(SleepError::is_invariant_violation);
    if fatal {
        ExitCode::from(EXIT_FATAL)
    } else {
        ExitCode::FAILURE
    }
}
