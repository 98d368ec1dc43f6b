//! Configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use aoform_reconcile::RetryPolicy;

use crate::error::CliError;
use crate::wallet::Wallet;

/// Default signing relay for spawns and messages.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:4004";

/// Default compute unit for result reads.
pub const DEFAULT_CU_URL: &str = "https://cu.ao-testnet.xyz";

/// CLI configuration.
#[derive(Clone)]
pub struct Config {
    /// Raw wallet JSON, if provided.
    wallet_json: Option<String>,

    /// Signing relay URL.
    pub gateway_url: String,

    /// Compute unit URL.
    pub cu_url: String,

    /// Attempts for spawn and code push.
    pub retry_attempts: u32,

    /// Seconds between attempts.
    pub retry_delay_secs: u64,

    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("wallet_json", &self.wallet_json.as_ref().map(|_| "<redacted>"))
            .field("gateway_url", &self.gateway_url)
            .field("cu_url", &self.cu_url)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_json: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            cu_url: DEFAULT_CU_URL.to_string(),
            retry_attempts: aoform_reconcile::DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: aoform_reconcile::DEFAULT_RETRY_DELAY.as_secs(),
            http_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let wallet_json = lookup("WALLET_JSON").filter(|s| !s.trim().is_empty());
        let gateway_url = lookup("AOFORM_GATEWAY_URL").unwrap_or(defaults.gateway_url);
        let cu_url = lookup("AOFORM_CU_URL").unwrap_or(defaults.cu_url);
        let retry_attempts =
            parse_var(&lookup, "AOFORM_RETRY_ATTEMPTS")?.unwrap_or(defaults.retry_attempts);
        let retry_delay_secs =
            parse_var(&lookup, "AOFORM_RETRY_DELAY_SECS")?.unwrap_or(defaults.retry_delay_secs);
        let http_timeout_secs =
            parse_var(&lookup, "AOFORM_HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout_secs);

        Ok(Self {
            wallet_json,
            gateway_url,
            cu_url,
            retry_attempts,
            retry_delay_secs,
            http_timeout_secs,
        })
    }

    /// Parse the configured wallet.
    ///
    /// Fails with [`CliError::MissingWallet`] when `WALLET_JSON` is unset.
    pub fn wallet(&self) -> Result<Wallet, CliError> {
        let json = self.wallet_json.as_deref().ok_or(CliError::MissingWallet)?;
        Wallet::from_json(json)
    }

    /// Retry policy for spawn and push.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn with_wallet_json(mut self, json: impl Into<String>) -> Self {
        self.wallet_json = Some(json.into());
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
