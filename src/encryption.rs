//! Passphrase encryption of text messages
//!
//! The code a user chooses is the only key material. Ciphertext is the
//! armored [`secretcrypt`] format, so salt and nonce travel with it and
//! nothing else needs storing.
//!
//! Any ciphertext the code cannot open (wrong code, tampering, truncation,
//! garbage) is reported with [`ErrorKind::WrongCode`]. The specific cause is
//! kept as the error source.

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};
use crate::secretcrypt;
use crate::varmor;

/// Message carried by every wrong-code failure.
pub const WRONG_CODE_MESSAGE: &str = "Code is wrong";

/// Encrypt `plaintext` under `code`, returning armored ciphertext.
pub fn encrypt(plaintext: &str, code: &str) -> Result<String> {
    let sealed = secretcrypt::encrypt(code.as_bytes(), plaintext.as_bytes())
        .map_err(|e| e.with_context("encryption failed"))?;
    Ok(varmor::wrap(&sealed))
}

/// Decrypt armored `ciphertext` with `code`.
pub fn decrypt(ciphertext: &str, code: &str) -> Result<String> {
    let sealed = match varmor::unwrap(ciphertext) {
        Ok(sealed) => sealed,
        Err(e) => {
            secretcrypt::discard_key_derivation(code.as_bytes());
            return Err(wrong_code(e));
        }
    };

    let plaintext = secretcrypt::decrypt(code.as_bytes(), &sealed).map_err(|e| match e.kind {
        Some(ErrorKind::ScryptFailure) | Some(ErrorKind::SecretboxFailure) => {
            e.with_context("decryption failed")
        }
        Some(ErrorKind::WrongCode) => wrong_code(e),
        _ => {
            // Layout was rejected before any key derivation ran.
            secretcrypt::discard_key_derivation(code.as_bytes());
            wrong_code(e)
        }
    })?;

    String::from_utf8(plaintext).map_err(|e| {
        RecretError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "authenticated plaintext is not valid UTF-8",
            e,
        )
    })
}

fn wrong_code(cause: RecretError) -> RecretError {
    cause.reclassify(ErrorCategory::User, ErrorKind::WrongCode, WRONG_CODE_MESSAGE)
}
