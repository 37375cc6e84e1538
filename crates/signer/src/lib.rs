//! Signed resource tokens for the filegate gateway.
//!
//! This crate provides:
//! - Shared secret loading and generation
//! - Token encoding (`nonce.resourceId.signature`)
//! - Constant-time token verification

pub mod codec;
pub mod error;
pub mod key;

pub use codec::TokenCodec;
pub use error::{TokenError, TokenResult};
pub use key::SecretKey;
