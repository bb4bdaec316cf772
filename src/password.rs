//! Password reading functionality
//!
//! The core never prompts or reads files itself; it receives a [`Password`]
//! from one of these readers.

use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use std::fmt;
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// A user password, wiped from memory when dropped.
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(password: String) -> Self {
        Self(Zeroizing::new(password))
    }

    /// UTF-8 bytes fed to key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[cfg(test)]
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self::new(password.to_owned())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Trait for obtaining a password from the user or some other source
pub trait PasswordReader {
    fn read_password(&mut self) -> Result<Password>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPasswordReader {
    password: Password,
}

impl ConstantPasswordReader {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Password::new(password.into()),
        }
    }
}

impl PasswordReader for ConstantPasswordReader {
    fn read_password(&mut self) -> Result<Password> {
        Ok(self.password.clone())
    }
}

/// Reads a password from any io::Read source
///
/// The input must be valid UTF-8. A single trailing newline (`\n` or
/// `\r\n`) is removed so that `echo secret | passbox ...` works.
pub struct ReaderPasswordReader {
    reader: Box<dyn Read>,
}

impl ReaderPasswordReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PasswordReader for ReaderPasswordReader {
    fn read_password(&mut self) -> Result<Password> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading password: {}", e),
                e,
            )
        })?;

        let mut end = data.len();
        if data[..end].ends_with(b"\n") {
            end -= 1;
            if data[..end].ends_with(b"\r") {
                end -= 1;
            }
        }

        let text = std::str::from_utf8(&data[..end]).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "password is not valid UTF-8",
                e,
            )
        })?;
        Ok(Password::from(text))
    }
}

/// Reads password from terminal with no echo
#[derive(Default)]
pub struct TerminalPasswordReader;

impl TerminalPasswordReader {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordReader for TerminalPasswordReader {
    fn read_password(&mut self) -> Result<Password> {
        if !io::stdin().is_terminal() {
            return Err(PassboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Password (passbox): ")
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                PassboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // rpassword hands back a plain String; move it straight into
        // zeroizing storage.
        let password = rpassword::read_password().map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Password::new(password))
    }
}
