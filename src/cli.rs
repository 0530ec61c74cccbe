//! Remedy command line
//!
//! Inspect the built-in catalog and configuration, or rehearse a recovery
//! against simulated remediation handlers.

use crate::catalog::builtin::{self, RemediationHandler};
use crate::catalog::{ActionKind, RaisedError, RecoverableErrorKind};
use crate::config::OrchestratorConfig;
use crate::errors::{EXIT_RECOVERY_FAILED, EXIT_SUCCESS};
use crate::observability::telemetry::{init_tracing, init_tracing_json, init_tracing_with_filter};
use crate::orchestrator::{RecoveryOrchestrator, RecoveryPhase};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "remedy")]
#[command(about = "Error recovery orchestrator: strategies, circuit breakers, backoff retries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in recovery strategies
    Catalog,

    /// Print the effective configuration
    Config {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Run one recovery against simulated remediation handlers
    Simulate {
        /// Error type name, e.g. NetworkError
        #[arg(short = 't', long, default_value = "NetworkError")]
        error_type: String,

        /// Error message
        #[arg(short, long, default_value = "fetch failed: ECONNRESET")]
        message: String,

        /// Error kind (network, timeout, rate_limit, authentication, storage, state, resource)
        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<RecoverableErrorKind>,

        /// Action id or action kind that fails (repeatable)
        #[arg(long = "fail", value_name = "ACTION")]
        fail: Vec<String>,

        /// Action id or action kind that never completes (repeatable)
        #[arg(long = "hang", value_name = "ACTION")]
        hang: Vec<String>,
    },
}

fn parse_kind(raw: &str) -> std::result::Result<RecoverableErrorKind, String> {
    let normalized = raw.trim().to_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("unknown error kind '{}'", raw))
}

/// Remediation handler driven by command line flags.
#[derive(Debug, Default)]
pub struct SimulatedHandler {
    failing: HashSet<String>,
    hanging: HashSet<String>,
}

impl SimulatedHandler {
    pub fn new(failing: impl IntoIterator<Item = String>, hanging: impl IntoIterator<Item = String>) -> Self {
        Self {
            failing: failing.into_iter().collect(),
            hanging: hanging.into_iter().collect(),
        }
    }

    fn selected(set: &HashSet<String>, kind: ActionKind, action_id: &str) -> bool {
        set.contains(action_id) || set.contains(kind.as_str())
    }
}

#[async_trait]
impl RemediationHandler for SimulatedHandler {
    async fn perform(&self, kind: ActionKind, action_id: &str) -> Result<bool> {
        if Self::selected(&self.hanging, kind, action_id) {
            futures::future::pending::<()>().await;
        }
        if Self::selected(&self.failing, kind, action_id) {
            anyhow::bail!("simulated {} failure in '{}'", kind, action_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(true)
    }
}

/// Parse arguments and run the selected command. Returns the exit code.
pub async fn run() -> Result<u8> {
    let cli = Cli::parse();

    if cli.log_json {
        init_tracing_json(if cli.verbose { "debug" } else { "info" });
    } else if cli.verbose {
        init_tracing_with_filter("debug");
    } else {
        init_tracing();
    }

    let config = OrchestratorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Catalog => {
            let strategies = builtin::strategies(Arc::new(SimulatedHandler::default()));
            println!("{}", serde_json::to_string_pretty(&strategies)?);
            Ok(EXIT_SUCCESS)
        }
        Commands::Config { json } => {
            let rendered = if json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config).context("Failed to render config")?
            };
            println!("{}", rendered);
            Ok(EXIT_SUCCESS)
        }
        Commands::Simulate {
            error_type,
            message,
            kind,
            fail,
            hang,
        } => {
            let mut error = RaisedError::new(error_type, message);
            if let Some(kind) = kind {
                error = error.with_kind(kind);
            }
            simulate(config, error, SimulatedHandler::new(fail, hang)).await
        }
    }
}

async fn simulate(config: OrchestratorConfig, error: RaisedError, handler: SimulatedHandler) -> Result<u8> {
    let orchestrator = RecoveryOrchestrator::new(config, builtin::catalog(Arc::new(handler)))?;

    let (recovery_id, _) = orchestrator
        .recover(error, serde_json::json!({ "source": "remedy simulate" }))
        .await?;
    let phase = orchestrator
        .wait_until_settled(&recovery_id, Duration::from_millis(50))
        .await;

    let report = serde_json::json!({
        "recovery_id": recovery_id,
        "phase": phase,
        "context": orchestrator.recovery(&recovery_id),
        "analytics": orchestrator.analytics(),
        "circuit_breakers": orchestrator.circuit_breakers(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match phase {
        Some(RecoveryPhase::Succeeded) => EXIT_SUCCESS,
        _ => EXIT_RECOVERY_FAILED,
    })
}
