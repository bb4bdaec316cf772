//! Passbox - password-based envelope encryption
//!
//! A random content key encrypts caller data. The content key itself is
//! wrapped under a key derived from the user's password, and only the
//! wrapped form is ever persisted, together with a verifier that allows
//! cheap password checks.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod password;
pub mod password_encryption;
pub mod random;
pub mod sealed;
pub mod store;

pub use config::EncryptionConfig;
pub use envelope::Envelope;
pub use error::{ErrorCategory, ErrorKind, PassboxError, Result};
pub use kdf::KdfParams;
pub use password::Password;
pub use password_encryption::{ContentKey, PasswordEncryption};
