//! Encryption configuration

use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use crate::kdf::KdfParams;
use serde::{Deserialize, Serialize};

/// Default salt length in bytes
pub const DEFAULT_SALT_LEN: usize = 16;

/// Smallest salt length accepted by [`EncryptionConfig::validate`]
pub const MIN_SALT_LEN: usize = 8;

/// Largest salt length accepted by [`EncryptionConfig::validate`]
pub const MAX_SALT_LEN: usize = 64;

/// Parameters used when creating a new envelope.
///
/// Only creation consumes this. The KDF parameters are recorded in the
/// envelope itself so later operations never depend on the caller passing
/// the same configuration again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// Key derivation function and cost.
    #[serde(default)]
    pub kdf: KdfParams,

    /// Length of the random salt generated for each envelope.
    #[serde(default = "default_salt_len")]
    pub salt_len: usize,
}

fn default_salt_len() -> usize {
    DEFAULT_SALT_LEN
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

impl EncryptionConfig {
    /// Default configuration with a different key derivation function.
    pub fn with_kdf(kdf: KdfParams) -> Self {
        Self {
            kdf,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&self.salt_len) {
            return Err(PassboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                format!(
                    "salt length must be between {} and {} bytes, got {}",
                    MIN_SALT_LEN, MAX_SALT_LEN, self.salt_len
                ),
            ));
        }
        self.kdf.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EncryptionConfig::default();
        assert_eq!(config.salt_len, DEFAULT_SALT_LEN);
        assert_eq!(config.kdf, KdfParams::pbkdf2(crate::kdf::DEFAULT_PBKDF2_ITERATIONS));
        config.validate().unwrap();
    }

    #[test]
    fn test_salt_len_bounds() {
        let mut config = EncryptionConfig::default();
        config.salt_len = MIN_SALT_LEN - 1;
        assert_eq!(
            config.validate().unwrap_err().kind,
            Some(ErrorKind::InvalidConfig)
        );

        config.salt_len = MAX_SALT_LEN + 1;
        assert_eq!(
            config.validate().unwrap_err().kind,
            Some(ErrorKind::InvalidConfig)
        );

        config.salt_len = MIN_SALT_LEN;
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_kdf() {
        let config = EncryptionConfig::with_kdf(KdfParams::pbkdf2(0));
        assert_eq!(
            config.validate().unwrap_err().kind,
            Some(ErrorKind::DerivationFailed)
        );
    }

    #[test]
    fn test_json_defaults() {
        let config: EncryptionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EncryptionConfig::default());

        let config: EncryptionConfig = serde_json::from_str(
            r#"{"kdf":{"algorithm":"pbkdf2-sha256","iterations":1000},"saltLen":8}"#,
        )
        .unwrap();
        assert_eq!(config.kdf, KdfParams::pbkdf2(1000));
        assert_eq!(config.salt_len, 8);
    }
}
