//! Creation and retrieval of secrets
//!
//! Ties the [`MessageStore`] to the encryption primitive. Every call is
//! synchronous and spends one scrypt derivation, so async callers should run
//! these on a blocking thread.

use crate::encryption;
use crate::error::{RecretError, Result};
use crate::store::{MessageStore, SecretId};

/// Shown when a secret id has no record.
pub const NOT_FOUND_MESSAGE: &str = "We can't find this secret";

pub struct SecretService<S> {
    store: S,
}

impl<S: MessageStore> SecretService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Encrypt `message` under `code` and persist only the ciphertext.
    pub fn create(&self, message: &str, code: &str) -> Result<SecretId> {
        let ciphertext = encryption::encrypt(message, code)?;
        let id = self
            .store
            .create(&ciphertext)
            .map_err(|e| e.with_context("failed to store secret"))?;
        tracing::info!(%id, "created secret");
        Ok(id)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.find_by_id(id)?.is_some())
    }

    /// Recover the message stored under `id`.
    ///
    /// Fails with `NotFound` for unknown ids and `WrongCode` when `code`
    /// does not open the stored ciphertext.
    pub fn unlock(&self, id: &str, code: &str) -> Result<String> {
        let secret = self
            .store
            .find_by_id(id)?
            .ok_or_else(|| RecretError::not_found(NOT_FOUND_MESSAGE))?;

        encryption::decrypt(&secret.ciphertext, code).inspect_err(|e| {
            if e.is_wrong_code() {
                tracing::info!(%id, "unlock attempt with wrong code");
            }
        })
    }
}
