//! The apply engine.
//!
//! Each desired process moves through:
//!
//! - **Spawned**: the process exists (reused from state or spawned now)
//! - **Skipped**: the main source fingerprint matches the recorded one
//! - **Deployed**: the bundle was evaluated without error and recorded
//! - **Failed**: the push exhausted its retries; other processes continue
//!
//! Spawn exhaustion and remote evaluation errors are fatal and abort the run.
//! In the two-phase topology every spawn completes before the first push so
//! the directory table can name any process in the run.

use std::sync::OnceLock;

use tracing::{debug, error, info};

use crate::bundle::{Directory, ScaffoldTemplate, Sources};
use crate::desired::{validate_specs, ProcessSpec};
use crate::error::ReconcileError;
use crate::gateway::{NetworkGateway, Signer, SpawnRequest, Tag};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::state::{DeploymentRecord, DeploymentState, StateStore};

/// Ordering of spawns relative to pushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Topology {
    /// Spawn every process, then push to every process.
    #[default]
    TwoPhase,

    /// Spawn and push one process at a time. No directory table.
    SinglePhase,
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    pub spawn_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
    pub topology: Topology,
    pub template: ScaffoldTemplate,
}

/// Terminal state of one process in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Already up to date; nothing was sent.
    Skipped,

    /// Code pushed and recorded.
    Deployed,

    /// Push gave up; the recorded hash is unchanged.
    Failed { reason: String },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "up-to-date",
            Self::Deployed => "deployed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-process result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub name: String,
    pub process_id: String,
    /// Whether the process was spawned during this run.
    pub spawned: bool,
    pub outcome: Outcome,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processes: Vec<ProcessReport>,
}

impl RunReport {
    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.processes.iter().filter(|p| predicate(&p.outcome)).count()
    }

    pub fn deployed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Deployed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// What a run would do for one process, computed without network calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// No process ID recorded: spawn, then push.
    SpawnAndPush,

    /// Recorded process whose source changed.
    Push { process_id: String },

    /// Recorded process whose source is unchanged.
    Skip { process_id: String },
}

/// Validate the desired list and read every source file.
///
/// Runs before any network call so configuration errors never leave a
/// half-applied run behind. The text read here is what gets pushed.
fn prepare(
    specs: &[ProcessSpec],
    topology: Topology,
) -> Result<Vec<(&ProcessSpec, Sources)>, ReconcileError> {
    validate_specs(specs)?;

    if topology == Topology::SinglePhase {
        if let Some(spec) = specs.iter().find(|s| s.directory) {
            return Err(ReconcileError::configuration(format!(
                "process '{}' requests a directory table, which needs the two-phase topology",
                spec.name
            )));
        }
    }

    specs
        .iter()
        .map(|spec| -> Result<_, ReconcileError> { Ok((spec, Sources::load(spec)?)) })
        .collect()
}

/// Compute what a run would do, without network calls or state writes.
pub fn plan(
    specs: &[ProcessSpec],
    state: &DeploymentState,
    topology: Topology,
) -> Result<Vec<(String, PlanAction)>, ReconcileError> {
    let prepared = prepare(specs, topology)?;

    Ok(prepared
        .into_iter()
        .map(|(spec, sources)| {
            let action = match state.process_id(&spec.name) {
                None => PlanAction::SpawnAndPush,
                Some(pid) if sources.hash.matches(state.content_hash(&spec.name)) => PlanAction::Skip {
                    process_id: pid.to_string(),
                },
                Some(pid) => PlanAction::Push {
                    process_id: pid.to_string(),
                },
            };
            (spec.name.clone(), action)
        })
        .collect())
}

/// Reconciles desired processes against recorded state.
pub struct Reconciler<'g, G: NetworkGateway + ?Sized> {
    gateway: &'g G,
    signer: Signer,
    store: StateStore,
    config: ReconcilerConfig,
}

impl<'g, G: NetworkGateway + ?Sized> Reconciler<'g, G> {
    pub fn new(gateway: &'g G, signer: Signer, store: StateStore, config: ReconcilerConfig) -> Self {
        Self {
            gateway,
            signer,
            store,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn into_store(self) -> StateStore {
        self.store
    }

    /// Compute the plan for `specs` without touching the network or state.
    pub fn plan(&self, specs: &[ProcessSpec]) -> Result<Vec<(String, PlanAction)>, ReconcileError> {
        plan(specs, self.store.state(), self.config.topology)
    }

    /// Bring every process in `specs` to its desired state.
    ///
    /// On success the state file has been rewritten. On a fatal error the
    /// spawns and pushes that completed before it are already on disk.
    pub async fn run(&mut self, specs: &[ProcessSpec]) -> Result<RunReport, ReconcileError> {
        let prepared = prepare(specs, self.config.topology)?;
        let mut report = RunReport::default();

        match self.config.topology {
            Topology::TwoPhase => {
                let mut directory = Directory::new();
                let mut resolved = Vec::with_capacity(prepared.len());
                for (spec, _) in &prepared {
                    let (process_id, spawned) = self.resolve_process(spec).await?;
                    directory.insert(spec.name.clone(), process_id.clone());
                    resolved.push((process_id, spawned));
                }

                for ((spec, sources), (process_id, spawned)) in prepared.iter().zip(resolved) {
                    let outcome = self.push(spec, sources, &process_id, &directory).await?;
                    report.processes.push(ProcessReport {
                        name: spec.name.clone(),
                        process_id,
                        spawned,
                        outcome,
                    });
                }
            }
            Topology::SinglePhase => {
                let directory = Directory::new();
                for (spec, sources) in &prepared {
                    let (process_id, spawned) = self.resolve_process(spec).await?;
                    let outcome = self.push(spec, sources, &process_id, &directory).await?;
                    report.processes.push(ProcessReport {
                        name: spec.name.clone(),
                        process_id,
                        spawned,
                        outcome,
                    });
                }
            }
        }

        self.store.flush()?;
        info!(
            deployed = report.deployed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Reuse the recorded process ID or spawn a new process.
    ///
    /// A fresh process ID is committed to disk immediately so an interrupted
    /// run never orphans a remote process.
    async fn resolve_process(&mut self, spec: &ProcessSpec) -> Result<(String, bool), ReconcileError> {
        if let Some(process_id) = self.store.state().process_id(&spec.name) {
            info!(
                process = %spec.name,
                process_id,
                "Using existing process ID '{}' for process '{}'.",
                process_id,
                spec.name
            );
            return Ok((process_id.to_string(), false));
        }

        let request = SpawnRequest {
            module: spec.module.clone(),
            scheduler: spec.scheduler.clone(),
            tags: spec.tags.clone(),
        };
        info!(
            process = %spec.name,
            module = %request.module,
            scheduler = %request.scheduler,
            "Spawning process..."
        );

        let gateway = self.gateway;
        let signer = &self.signer;
        let label = format!("spawn process '{}'", spec.name);
        let process_id = run_with_retry(&self.config.spawn_retry, &label, || {
            gateway.spawn(&request, signer)
        })
        .await
        .map_err(|e| {
            error!(process = %spec.name, error = %e, "Failed to {label}");
            ReconcileError::SpawnFailed {
                name: spec.name.clone(),
                attempts: e.attempts(),
                source: e.into_inner(),
            }
        })?;

        info!(process = %spec.name, process_id = %process_id, "Spawned process");
        self.store
            .state_mut()
            .insert(spec.name.clone(), DeploymentRecord::spawned(process_id.clone()));
        self.store.flush()?;

        Ok((process_id, true))
    }

    /// Push the bundle if the main source changed, then record the new hash.
    ///
    /// A recorded hash is flushed at once so a later fatal error in the same
    /// run cannot cause this code to be evaluated again.
    async fn push(
        &mut self,
        spec: &ProcessSpec,
        sources: &Sources,
        process_id: &str,
        directory: &Directory,
    ) -> Result<Outcome, ReconcileError> {
        if sources.hash.matches(self.store.state().content_hash(&spec.name)) {
            info!(process = %spec.name, "Process '{}' is up-to-date.", spec.name);
            return Ok(Outcome::Skipped);
        }

        let bundle = self.config.template.build(spec, directory, sources);
        let tags = [Tag::eval_action()];
        info!(process = %spec.name, process_id, bytes = bundle.len(), "Sending code...");

        // A message that was sent but whose result could not be read is not
        // sent again; later attempts only re-read the result.
        let message_id: OnceLock<String> = OnceLock::new();
        let gateway = self.gateway;
        let signer = &self.signer;
        let label = format!("send 'eval' action for process '{}'", spec.name);

        let result = run_with_retry(&self.config.push_retry, &label, || {
            let (bundle, tags, message_id) = (&bundle, &tags, &message_id);
            async move {
                let id = match message_id.get() {
                    Some(id) => id.clone(),
                    None => {
                        let id = gateway.send_message(process_id, bundle, tags, signer).await?;
                        info!(process_id, message_id = %id, "Eval message sent");
                        message_id.get_or_init(|| id).clone()
                    }
                };
                gateway.fetch_result(process_id, &id).await
            }
        })
        .await;

        let eval = match result {
            Ok(eval) => eval,
            Err(e) => {
                error!(process = %spec.name, error = %e, "Failed to {label}");
                return Ok(Outcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        if let Some(details) = eval.error {
            error!(process = %spec.name, process_id, details = %details, "Remote evaluation failed");
            return Err(ReconcileError::RemoteEvaluation {
                name: spec.name.clone(),
                details,
            });
        }

        info!(process = %spec.name, "Successfully sent 'eval' action for process '{}'.", spec.name);
        if let Some(output) = &eval.output {
            debug!(process = %spec.name, output = %output, "Eval output");
        }

        self.store.state_mut().insert(
            spec.name.clone(),
            DeploymentRecord {
                process_id: process_id.to_string(),
                content_hash: Some(sources.hash.as_str().to_string()),
            },
        );
        self.store.flush()?;
        Ok(Outcome::Deployed)
    }
}
