use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::builtins;
use crate::config::Config;
use crate::runtime::{Runtime, RuntimeOptions};
use crate::script::Script;
use crate::types::Command;

#[derive(Parser)]
#[command(name = "routine")]
#[command(about = "Routine - drive command-emitting routines through effect handlers", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a JSON script against the built-in handlers (WAIT, ECHO, FAIL, NOOP)
    Run {
        /// Script file to run
        script: PathBuf,

        /// Fail deferred results that take longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the resolved configuration as TOML
    Config,
}

/// A command that reached the sink
#[derive(Debug, Clone, Serialize)]
pub struct SunkCommand {
    pub at: DateTime<Utc>,
    pub command: Command,
}

/// Everything a script run produced
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub sunk: Vec<SunkCommand>,
    pub result: JsonValue,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let timeout_override = match &cli.command {
        Commands::Run { timeout_ms, .. } => *timeout_ms,
        Commands::Config => None,
    };

    // Load before doing anything so config errors show up first
    let config = Config::builder()
        .config_path(cli.config)
        .deferred_timeout_ms(timeout_override)
        .build()
        .context("Failed to load configuration")?;

    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Run { script, .. } => {
            let script = Script::from_file(&script)?;

            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            // Printed on arrival, failed runs included
            let report = run_script(script, &config, token, |sunk| {
                match serde_json::to_string(sunk) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "failed to render sunk command"),
                }
            })
            .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "result": report.result }))?
            );
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Install the global tracing subscriber; `RUST_LOG` wins over `filter`
pub fn init_logging(filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // A subscriber may already be installed (tests, embedding hosts)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run a script with the built-in handlers and collect what reached the sink
///
/// `on_sunk` sees each sunk command as it arrives, including on runs that
/// end in an error.
pub async fn run_script<F>(
    script: Script,
    config: &Config,
    token: CancellationToken,
    mut on_sunk: F,
) -> Result<ScriptReport>
where
    F: FnMut(&SunkCommand),
{
    let name = script.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
    let runtime = Runtime::with_options(
        builtins::registry()?,
        RuntimeOptions::from(&config.runtime),
    );

    let mut sunk = Vec::new();
    let result = runtime
        .run_with_cancellation(
            script.into_routine(),
            |command: Command| {
                let entry = SunkCommand {
                    at: Utc::now(),
                    command,
                };
                on_sunk(&entry);
                sunk.push(entry);
            },
            token,
        )
        .await
        .with_context(|| format!("Script '{}' failed", name))?;

    tracing::info!(script = %name, sunk = sunk.len(), "script finished");
    Ok(ScriptReport { sunk, result })
}
