//! Reading secret codes for the command line

use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as raw bytes.
    ///
    /// Returns the passphrase wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed passphrase (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: Vec<u8>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.passphrase).clone()))
    }
}

/// Reads passphrase from any io::Read source
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading code: {}", e),
                e,
            )
        })?;
        Ok(data)
    }
}

/// Reads passphrase from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new("Code (recret): ")
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(RecretError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read code from terminal - stdin is not a terminal",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(self.prompt.as_bytes())
            .and_then(|_| stderr.flush())
            .map_err(|e| {
                RecretError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // rpassword returns a plain String; move it into a zeroizing buffer.
        let passphrase = rpassword::read_password().map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading code: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

/// Read a code and turn it into the string the encryption layer expects.
///
/// One trailing newline (`\n` or `\r\n`) is dropped so that `echo code |`
/// yields the same code as typing it.
pub fn read_code(reader: &mut dyn PassphraseReader) -> Result<Zeroizing<String>> {
    let raw = reader.read_passphrase()?;
    let bytes = raw
        .strip_suffix(b"\r\n")
        .or_else(|| raw.strip_suffix(b"\n"))
        .unwrap_or(&raw);

    let code = std::str::from_utf8(bytes).map_err(|e| {
        RecretError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "code is not valid UTF-8",
            e,
        )
    })?;

    if code.is_empty() {
        return Err(RecretError::with_kind(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "code must not be empty",
        ));
    }

    Ok(Zeroizing::new(code.to_string()))
}
