//! Token encoding and verification.
//!
//! A token is `<nonce>.<resourceId>.<signature>` where `signature` is the
//! URL-safe base64 HMAC-SHA256 of `"<nonce>:<resourceId>"`, truncated to a
//! fixed prefix. The identifier is authenticated but not encrypted.

use crate::error::{TokenError, TokenResult};
use crate::key::SecretKey;
use base64::Engine;
use filegate_core::config::TokenConfig;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are redrawn so every symbol is equally likely.
const NONCE_REJECT_THRESHOLD: u8 = 248;

const SEPARATOR: char = '.';

/// Produces and verifies opaque resource tokens.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    secret: SecretKey,
    nonce_len: usize,
    signature_len: usize,
}

impl TokenCodec {
    /// Create a codec with the default nonce and signature lengths.
    pub fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            nonce_len: filegate_core::DEFAULT_NONCE_LEN,
            signature_len: filegate_core::DEFAULT_SIGNATURE_LEN,
        }
    }

    /// Create a codec from token configuration, loading the secret it names.
    pub fn from_config(config: &TokenConfig) -> TokenResult<Self> {
        config.validate().map_err(TokenError::Secret)?;
        let secret = SecretKey::from_config(&config.secret)?;
        Ok(Self {
            secret,
            nonce_len: config.nonce_len,
            signature_len: config.signature_len,
        })
    }

    /// Override the nonce length.
    pub fn with_nonce_len(mut self, nonce_len: usize) -> Self {
        self.nonce_len = nonce_len.max(1);
        self
    }

    /// Override the signature prefix length (capped at the full encoded MAC).
    pub fn with_signature_len(mut self, signature_len: usize) -> Self {
        self.signature_len = signature_len.clamp(1, filegate_core::MAX_SIGNATURE_LEN);
        self
    }

    /// Issue a fresh token for a resource identifier.
    pub fn encode(&self, resource_id: &str) -> TokenResult<String> {
        if resource_id.is_empty() {
            return Err(TokenError::InvalidIdentifier(
                "identifier must not be empty".to_string(),
            ));
        }
        if resource_id.contains(SEPARATOR) {
            return Err(TokenError::InvalidIdentifier(format!(
                "identifier must not contain '{SEPARATOR}': {resource_id}"
            )));
        }

        let nonce = self.generate_nonce();
        let signature = self.sign(&nonce, resource_id)?;
        Ok(format!("{nonce}{SEPARATOR}{resource_id}{SEPARATOR}{signature}"))
    }

    /// Verify a token and return the embedded resource identifier.
    pub fn decode<'a>(&self, token: &'a str) -> TokenResult<&'a str> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let &[nonce, resource_id, signature] = parts.as_slice() else {
            return Err(TokenError::MalformedToken { parts: parts.len() });
        };
        if nonce.is_empty() || resource_id.is_empty() || signature.is_empty() {
            return Err(TokenError::MalformedToken { parts: parts.len() });
        }

        let expected = self.sign(nonce, resource_id)?;
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(resource_id)
        } else {
            Err(TokenError::SignatureMismatch)
        }
    }

    fn sign(&self, nonce: &str, resource_id: &str) -> TokenResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| TokenError::Secret(format!("invalid HMAC key: {e}")))?;
        mac.update(nonce.as_bytes());
        mac.update(b":");
        mac.update(resource_id.as_bytes());

        let mut encoded =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        encoded.truncate(self.signature_len);
        Ok(encoded)
    }

    fn generate_nonce(&self) -> String {
        let mut nonce = String::with_capacity(self.nonce_len);
        let mut buf = [0u8; 32];
        while nonce.len() < self.nonce_len {
            OsRng.fill_bytes(&mut buf);
            for &b in buf.iter().filter(|&&b| b < NONCE_REJECT_THRESHOLD) {
                if nonce.len() == self.nonce_len {
                    break;
                }
                nonce.push(NONCE_ALPHABET[(b % 62) as usize] as char);
            }
        }
        nonce
    }
}
