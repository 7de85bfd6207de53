//! Versioned armoring for binary data
//!
//! Provides base64url encoding with a version prefix for encrypted data.
//! The armored format is:
//! - Free of whitespace (including newlines)
//! - Safe to embed in URLs and store in a TEXT column
//! - Safe to pass unescaped in a POSIX shell

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Magic prefix for all recret versions
const MAGIC_PREFIX: &str = "recret";

/// Version 1 magic marker
const V1_MAGIC: &str = "recret1:";

/// Wrap bytes in armor, returning the armored string
///
/// Format: recret1:{base64url-no-padding}
pub fn wrap(body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}", V1_MAGIC, encoded)
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    if armored.len() < V1_MAGIC.len() {
        return Err(RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input size smaller than magic marker; likely truncated",
        ));
    }

    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                format!("base64 decoding failed: {}", e),
                e,
            )
        })
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "input claims to be recret ciphertext, but not a version we support",
        ))
    } else {
        Err(RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input unrecognized as recret ciphertext",
        ))
    }
}
