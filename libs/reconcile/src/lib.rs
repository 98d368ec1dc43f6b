//! Deployment reconciliation core.
//!
//! This library converges a declarative list of remote processes to the
//! source code checked into the working tree. Key concepts:
//!
//! - **Desired state**: the process specifications read from `processes.yaml`.
//! - **Deployment state**: what was last pushed, persisted in `state.yaml`.
//! - **Convergence**: spawn missing processes, then push code whose
//!   fingerprint differs from the recorded one.
//!
//! # Invariants
//!
//! - A process name is spawned at most once; its process ID is reused forever.
//! - Code is pushed only when the main source fingerprint changed.
//! - Every spawn completes before the first push (two-phase topology).
//! - Running twice with unchanged inputs performs no network calls.

pub mod bundle;
pub mod desired;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod retry;
pub mod state;

pub use bundle::{Directory, ScaffoldTemplate, Sources};
pub use desired::{load_desired, validate_specs, ProcessSpec};
pub use engine::{
    plan, Outcome, PlanAction, ProcessReport, Reconciler, ReconcilerConfig, RunReport, Topology,
};
pub use error::ReconcileError;
pub use fingerprint::{read_fingerprinted, ContentHash};
pub use gateway::{
    EvalResult, GatewayError, MockGateway, NetworkGateway, SentMessage, Signer, SpawnRequest, Tag,
};
pub use retry::{run_with_retry, RetryError, RetryPolicy, Retryable};
pub use state::{DeploymentRecord, DeploymentState, StateStore};

/// Default number of attempts for spawn and code push.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(30);
