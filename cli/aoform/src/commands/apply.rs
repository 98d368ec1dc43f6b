//! Apply command.
//!
//! `aoform apply` converges every process declared in the desired-state file:
//! missing processes are spawned, changed code is pushed, and the state file
//! next to it is rewritten.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use aoform_reconcile::{
    load_desired, plan, NetworkGateway, ProcessSpec, Reconciler, ReconcilerConfig, RunReport,
    Signer, StateStore, Topology,
};
use clap::Args;
use tracing::info;

use crate::client::HttpGateway;
use crate::config::Config;
use crate::error::CliError;
use crate::output::{plan_rows, print_output, print_success, report_rows, OutputFormat};

use super::CommandContext;

/// Desired-state file used when `--file` is omitted.
pub const DEFAULT_DESIRED_FILE: &str = "processes.yaml";

/// State file paired with [`DEFAULT_DESIRED_FILE`].
pub const DEFAULT_STATE_FILE: &str = "state.yaml";

/// Deploy or update processes.
#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Desired-state file. Defaults to ./processes.yaml.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Print the plan without making any network calls or writing state.
    #[arg(long)]
    pub dry_run: bool,

    /// Spawn and push one process at a time (no directory table).
    #[arg(long)]
    pub single_phase: bool,

    /// Attempts for spawn and code push. Overrides AOFORM_RETRY_ATTEMPTS.
    #[arg(long, value_name = "N")]
    pub retry_attempts: Option<u32>,

    /// Seconds between attempts. Overrides AOFORM_RETRY_DELAY_SECS.
    #[arg(long, value_name = "SECONDS")]
    pub retry_delay: Option<u64>,
}

impl ApplyCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let desired_path = self.desired_path();
        let state_path = state_path_for(&desired_path);

        if self.dry_run {
            let specs = load_desired(&desired_path)?;
            let state = StateStore::open(&state_path)?.into_state();
            let plan = plan(&specs, &state, self.topology())?;
            print_output(&plan_rows(&plan), ctx.format);
            return Ok(());
        }

        let wallet = ctx.config.wallet()?;
        info!(address = %wallet.address(), "Loaded wallet");

        let specs = load_desired(&desired_path)?;
        let gateway = HttpGateway::new(&ctx.config)?;
        let report = self
            .execute(&gateway, wallet.signer(), &specs, &state_path, &ctx.config)
            .await?;

        print_output(&report_rows(&report), ctx.format);
        finish(&report, ctx.format)
    }

    /// Run the engine against `gateway` and return its report.
    pub async fn execute<G: NetworkGateway + ?Sized>(
        &self,
        gateway: &G,
        signer: Signer,
        specs: &[ProcessSpec],
        state_path: &Path,
        config: &Config,
    ) -> Result<RunReport> {
        let store = StateStore::open(state_path)?;
        let mut reconciler = Reconciler::new(gateway, signer, store, self.reconciler_config(config));
        Ok(reconciler.run(specs).await?)
    }

    fn desired_path(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DESIRED_FILE))
    }

    fn topology(&self) -> Topology {
        if self.single_phase {
            Topology::SinglePhase
        } else {
            Topology::TwoPhase
        }
    }

    /// Engine settings from config, with command-line overrides applied.
    pub fn reconciler_config(&self, config: &Config) -> ReconcilerConfig {
        let mut policy = config.retry_policy();
        if let Some(attempts) = self.retry_attempts {
            policy.max_attempts = attempts;
        }
        if let Some(delay) = self.retry_delay {
            policy.delay = Duration::from_secs(delay);
        }

        ReconcilerConfig {
            spawn_retry: policy,
            push_retry: policy,
            topology: self.topology(),
            ..Default::default()
        }
    }
}

/// Map a completed run to the command result.
fn finish(report: &RunReport, format: OutputFormat) -> Result<()> {
    if report.has_failures() {
        return Err(CliError::PartialFailure {
            failed: report.failed(),
            total: report.processes.len(),
        }
        .into());
    }

    if format == OutputFormat::Table {
        print_success(&format!(
            "{} deployed, {} up-to-date.",
            report.deployed(),
            report.skipped()
        ));
    }
    Ok(())
}

/// State file paired with a desired-state file.
///
/// `processes.yaml` pairs with `state.yaml`; any other name `x` pairs with
/// `state-x` in the same directory.
pub fn state_path_for(desired: &Path) -> PathBuf {
    let file_name = desired
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_DESIRED_FILE);

    if file_name == DEFAULT_DESIRED_FILE {
        desired.with_file_name(DEFAULT_STATE_FILE)
    } else {
        desired.with_file_name(format!("state-{file_name}"))
    }
}
