//! Authenticated encryption bound to a single key and nonce
//!
//! Wraps NaCl secretbox (XSalsa20Poly1305). Output is the combined form:
//! ciphertext followed by the 16-byte Poly1305 tag.

use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use std::fmt;

/// Length of a secretbox key in bytes
pub const KEY_LEN: usize = 32;

/// Length of a secretbox nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// An AEAD instance bound to exactly one (key, nonce) pair.
///
/// `seal` and `open` consume the instance, so the same binding cannot be
/// used for a second plaintext. Every call site builds a fresh one.
pub struct BoundCipher {
    cipher: XSalsa20Poly1305,
    nonce: Nonce,
}

impl BoundCipher {
    pub fn new(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            cipher: XSalsa20Poly1305::new(&(*key).into()),
            nonce: Nonce::from(*nonce),
        }
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    pub fn seal(self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.encrypt(&self.nonce, plaintext).map_err(|_| {
            PassboxError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::AuthenticationFailed,
                "secretbox sealing failed",
            )
        })
    }

    /// Verify the tag and decrypt.
    ///
    /// Fails with [`ErrorKind::AuthenticationFailed`] on a wrong key,
    /// wrong nonce, or any modification of `sealed`.
    pub fn open(self, sealed: &[u8]) -> Result<Vec<u8>> {
        self.cipher.decrypt(&self.nonce, sealed).map_err(|_| {
            PassboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "authentication failed: corrupt input or tampered-with data",
            )
        })
    }
}

impl fmt::Debug for BoundCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCipher").finish_non_exhaustive()
    }
}
