//! Wallet credential.
//!
//! The wallet is an RSA JSON Web Key. Its network address is the base64url
//! SHA-256 digest of the public modulus.

use aoform_reconcile::Signer;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::CliError;

#[derive(Deserialize)]
struct Jwk {
    kty: Option<String>,
    n: Option<String>,
}

/// Parsed wallet.
#[derive(Clone)]
pub struct Wallet {
    address: String,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish()
    }
}

impl Wallet {
    /// Parse wallet JSON and derive its address.
    pub fn from_json(json: &str) -> Result<Self, CliError> {
        let jwk: Jwk = serde_json::from_str(json)
            .map_err(|e| CliError::InvalidWallet(format!("not a JSON web key: {e}")))?;

        match jwk.kty.as_deref() {
            Some("RSA") => {}
            Some(other) => {
                return Err(CliError::InvalidWallet(format!(
                    "unsupported key type '{other}', expected RSA"
                )))
            }
            None => return Err(CliError::InvalidWallet("missing 'kty'".to_string())),
        }

        let n = jwk
            .n
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CliError::InvalidWallet("missing modulus 'n'".to_string()))?;
        let modulus = URL_SAFE_NO_PAD
            .decode(n.trim_end_matches('='))
            .map_err(|e| CliError::InvalidWallet(format!("modulus is not base64url: {e}")))?;

        Ok(Self {
            address: URL_SAFE_NO_PAD.encode(Sha256::digest(&modulus)),
        })
    }

    /// Network address of the wallet.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Signing identity handed to the engine.
    pub fn signer(&self) -> Signer {
        Signer::new(self.address.clone())
    }
}
