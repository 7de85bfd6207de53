//! Encryption/decryption using scrypt + XSalsa20Poly1305
//!
//! This module implements passphrase-based encryption using:
//! - scrypt for key derivation from passphrase
//! - NaCl secretbox (XSalsa20Poly1305) for authenticated encryption
//!
//! The binary format is:
//! - salt: 8 bytes
//! - nonce: 24 bytes
//! - length: 8 bytes (big-endian signed int64)
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use std::mem::{size_of, size_of_val};
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 8;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of derived key in bytes
const KEY_LEN: usize = 32;

/// scrypt N parameter (CPU/memory cost)
const SCRYPT_N: u32 = 32768;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

/// Derive a 32-byte key from a passphrase and salt using scrypt
fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(SCRYPT_N.ilog2() as u8, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        RecretError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            format!("failed to create scrypt params: {}", e),
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(passphrase, salt, &params, &mut key[..]).map_err(|e| {
        RecretError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            format!("scrypt key derivation failed: {}", e),
        )
    })?;

    Ok(key)
}

/// Run one key derivation against a fixed salt and throw the key away.
///
/// Callers use this on the rejection path for unparseable ciphertext so that
/// it costs the same scrypt work as a wrong passphrase.
pub fn discard_key_derivation(passphrase: &[u8]) {
    let _ = derive_key(passphrase, &[0u8; SALT_LEN]);
}

/// Encrypt plaintext with a passphrase using random salt and nonce
///
/// Returns the binary format: salt(8) + nonce(24) + length(8) + sealedbox(variable)
pub fn encrypt(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_deterministic(passphrase, plaintext, &salt, &nonce)
}

/// Encrypt plaintext with a passphrase using provided salt and nonce
///
/// This function is ONLY for generating known-answer output in tests.
/// NEVER use this in production - always use `encrypt()` which generates random salt/nonce.
pub fn encrypt_deterministic(
    passphrase: &[u8],
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;

    let cipher = XSalsa20Poly1305::new(&(*key).into());

    let nonce_obj = Nonce::from(*nonce);
    let sealed_box = cipher.encrypt(&nonce_obj, plaintext).map_err(|e| {
        RecretError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::SecretboxFailure,
            format!("encryption failed: {}", e),
        )
    })?;

    let sealed_box_len = sealed_box.len() as i64;
    let mut output =
        Vec::with_capacity(SALT_LEN + NONCE_LEN + size_of_val(&sealed_box_len) + sealed_box.len());
    output.extend_from_slice(salt);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box_len.to_be_bytes()); // big-endian i64
    output.extend_from_slice(&sealed_box);

    Ok(output)
}

/// The parsed, still-sealed components of a ciphertext.
struct Parsed<'a> {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    sealed_box: &'a [u8],
}

fn format_error(kind: ErrorKind, msg: &str) -> RecretError {
    RecretError::with_kind(ErrorCategory::User, kind, msg)
}

/// Split ciphertext into its components without doing any cryptography.
fn parse(ciphertext: &[u8]) -> Result<Parsed<'_>> {
    let mut pos = 0;

    let salt: [u8; SALT_LEN] = ciphertext
        .get(pos..pos + SALT_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            format_error(
                ErrorKind::TruncatedInput,
                "input likely truncated while reading salt",
            )
        })?;
    pos += SALT_LEN;

    let nonce: [u8; NONCE_LEN] = ciphertext
        .get(pos..pos + NONCE_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            format_error(
                ErrorKind::TruncatedInput,
                "input likely truncated while reading nonce",
            )
        })?;
    pos += NONCE_LEN;

    let length_bytes: [u8; 8] = ciphertext
        .get(pos..pos + size_of::<i64>())
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            format_error(
                ErrorKind::TruncatedInput,
                "input likely truncated while reading sealed box",
            )
        })?;
    let sealed_box_len = i64::from_be_bytes(length_bytes);
    pos += size_of::<i64>();

    if sealed_box_len < 0 {
        return Err(format_error(
            ErrorKind::BinaryFormat,
            "negative sealed box length (when interpreted as a big-endian i64)",
        ));
    }

    // Check if length exceeds platform's maximum isize. *Valid* input
    // can fail this check if the platforms' isize is small.
    if sealed_box_len > isize::MAX as i64 {
        return Err(format_error(
            ErrorKind::BinaryFormat,
            "sealed box length exceeds this system's max isize",
        ));
    }

    let sealed_box_len = sealed_box_len as usize;

    if sealed_box_len > ciphertext.len() - pos {
        return Err(format_error(
            ErrorKind::TruncatedInput,
            "truncated or corrupt input; claimed length greater than available input",
        ));
    }
    let sealed_box = &ciphertext[pos..pos + sealed_box_len];
    pos += sealed_box_len;

    if pos < ciphertext.len() {
        return Err(format_error(
            ErrorKind::TrailingData,
            "invalid input: unexpected data after sealed box",
        ));
    }

    Ok(Parsed {
        salt,
        nonce,
        sealed_box,
    })
}

/// Decrypt ciphertext with a passphrase
pub fn decrypt(passphrase: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let parsed = parse(ciphertext)?;

    let key = derive_key(passphrase, &parsed.salt)?;
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    let nonce_obj = Nonce::from(parsed.nonce);
    cipher.decrypt(&nonce_obj, parsed.sealed_box).map_err(|_| {
        RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::WrongCode,
            "corrupt input, tampered-with data, or bad passphrase",
        )
    })
}
