//! Shared secret handling.

use crate::error::{TokenError, TokenResult};
use base64::Engine;
use filegate_core::config::SecretConfig;
use rand_core::{OsRng, RngCore};
use std::fmt;
use std::path::Path;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Length of generated secrets in bytes.
const GENERATED_SECRET_LEN: usize = 32;

/// HMAC key shared by every instance that must accept the same links.
#[derive(Clone)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Wrap raw secret bytes, enforcing the minimum length.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> TokenResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::Secret(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Read a secret from a file. Surrounding whitespace is ignored.
    pub fn from_file(path: &Path) -> TokenResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_bytes(contents.trim().as_bytes().to_vec())
    }

    /// Read a secret from an environment variable.
    pub fn from_env(var: &str) -> TokenResult<Self> {
        let value = std::env::var(var)
            .map_err(|_| TokenError::Secret(format!("environment variable {var} is not set")))?;
        Self::from_bytes(value.trim().as_bytes().to_vec())
    }

    /// Load the secret described by the configuration.
    pub fn from_config(config: &SecretConfig) -> TokenResult<Self> {
        match config {
            SecretConfig::File { path } => Self::from_file(path),
            SecretConfig::Env { var } => Self::from_env(var),
            SecretConfig::Value { secret } => {
                tracing::warn!(
                    "token secret loaded from inline config value; prefer a file or environment variable"
                );
                Self::from_bytes(secret.as_bytes().to_vec())
            }
            SecretConfig::Generate => {
                tracing::warn!(
                    "generated an ephemeral token secret; issued links will stop working after restart"
                );
                Ok(Self::generate())
            }
        }
    }

    /// Encode for storage in a secret file.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}
