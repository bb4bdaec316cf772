use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The operating system's secure random number generator failed.
    RandomnessUnavailable,
    /// Key derivation was invoked with invalid parameters.
    DerivationFailed,
    /// The password does not match the envelope's verifier.
    WrongPassword,
    /// The verifier matched but the wrapped content key could not be
    /// opened, or the envelope record is malformed.
    EnvelopeCorrupted,
    /// A data ciphertext failed authentication. The password was correct
    /// for the envelope, but the ciphertext is damaged, tampered with, or
    /// unrelated to this envelope.
    AuthenticationFailed,
    /// The envelope was written by a newer, unsupported version.
    UnsupportedVersion,
    /// Encryption configuration is out of range.
    InvalidConfig,
    /// An envelope is already stored where a new one was to be created.
    EnvelopeExists,
    /// Length fields or binary layout of a data ciphertext are invalid.
    BinaryFormat,
    /// Input data ended before the expected component could be read.
    TruncatedInput,
    /// Additional bytes were present after the sealed payload.
    TrailingData,
    /// The armored representation is malformed (prefix or unsupported version).
    ArmoringInvalid,
    /// Base64 decoding of the armored payload failed.
    ArmoringDecode,
    /// Input claimed to be passbox but used a future/unsupported version.
    ArmoringFromFuture,
    /// Password could not be obtained from the configured reader.
    PasswordUnavailable,
    /// The envelope record could not be encoded or decoded.
    Serialization,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct PassboxError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl PassboxError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PassboxError>;
