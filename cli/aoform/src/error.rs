//! Error handling and display for the CLI.

use aoform_reconcile::{GatewayError, ReconcileError};
use colored::Colorize;
use thiserror::Error;

/// Exit status when the run finished but some processes failed.
pub const EXIT_PARTIAL_FAILURE: i32 = 2;

/// Exit status for fatal errors.
pub const EXIT_FATAL: i32 = 1;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Missing WALLET_JSON environment variable")]
    MissingWallet,

    #[error("Invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("{failed} of {total} process(es) failed to deploy")]
    PartialFailure { failed: usize, total: usize },
}

/// Exit status for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::PartialFailure { .. }) => EXIT_PARTIAL_FAILURE,
        _ => EXIT_FATAL,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::MissingWallet => {
                Some("Export the wallet JSON, e.g. `export WALLET_JSON=\"$(cat wallet.json)\"`.")
            }
            CliError::InvalidWallet(_) => Some("WALLET_JSON must hold an RSA JSON web key."),
            CliError::PartialFailure { .. } => {
                Some("Failed processes keep their previous code. Re-run `aoform apply` to retry.")
            }
        };
    }

    match err.downcast_ref::<ReconcileError>()? {
        ReconcileError::SpawnFailed {
            source: GatewayError::Transient(_),
            ..
        } => Some("Check that AOFORM_GATEWAY_URL points at a reachable signing relay."),
        ReconcileError::SpawnFailed { .. } => {
            Some("The network refused the spawn. Check the module and scheduler IDs.")
        }
        ReconcileError::RemoteEvaluation { .. } => Some(
            "Fix the error in the source and re-run. The process ID is kept and will be reused.",
        ),
        ReconcileError::Configuration(_) | ReconcileError::Desired(_) => {
            Some("Check processes.yaml and the source files it references.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let partial = anyhow::Error::new(CliError::PartialFailure { failed: 1, total: 3 });
        assert_eq!(exit_code(&partial), EXIT_PARTIAL_FAILURE);

        let fatal = anyhow::Error::new(CliError::MissingWallet);
        assert_eq!(exit_code(&fatal), EXIT_FATAL);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&other), EXIT_FATAL);
    }

    #[test]
    fn test_hints() {
        let remote = anyhow::Error::new(ReconcileError::RemoteEvaluation {
            name: "p1".to_string(),
            details: "syntax error".to_string(),
        });
        assert!(hint(&remote).unwrap().contains("process ID is kept"));

        let missing = anyhow::Error::new(CliError::MissingWallet);
        assert!(hint(&missing).unwrap().contains("WALLET_JSON"));

        assert!(hint(&anyhow::anyhow!("boom")).is_none());
    }
}
