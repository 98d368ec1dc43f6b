//! Fatal reconciliation errors.
//!
//! Anything returned as a [`ReconcileError`] aborts the run. Transient
//! network failures never surface here directly: the retry executor absorbs
//! them and only the exhausted outcome is escalated.

use thiserror::Error;

use crate::desired::DesiredStateError;
use crate::fingerprint::FingerprintError;
use crate::gateway::GatewayError;
use crate::state::StateError;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Invalid desired state or local inputs (no retry).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A process could not be spawned within the attempt budget.
    #[error("failed to spawn process '{name}' after {attempts} attempt(s): {source}")]
    SpawnFailed {
        name: String,
        attempts: u32,
        #[source]
        source: GatewayError,
    },

    /// The remote process reported an error while evaluating pushed code.
    #[error("process '{name}' rejected the pushed code: {details}")]
    RemoteEvaluation { name: String, details: String },

    /// Deployment state could not be read or written.
    #[error(transparent)]
    State(#[from] StateError),

    /// A source file could not be fingerprinted.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// The desired-state file could not be loaded.
    #[error(transparent)]
    Desired(#[from] DesiredStateError),
}

impl ReconcileError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
