//! The persisted password envelope
//!
//! Holds everything needed to recover the content key except the password:
//! the wrapped content key, the verifier, the salt and the nonce currently
//! bound to the wrapped key. None of it is secret without the password.
//!
//! Serialized as JSON with byte fields in standard base64:
//!
//! ```json
//! {
//!   "version": 1,
//!   "kdf": { "algorithm": "pbkdf2-sha256", "iterations": 600000 },
//!   "salt": "...",
//!   "nonce": "...",
//!   "wrappedContentKey": "...",
//!   "verifier": "..."
//! }
//! ```

use crate::cipher::{KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::config::{MAX_SALT_LEN, MIN_SALT_LEN};
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use crate::kdf::KdfParams;
use serde::{Deserialize, Serialize};

/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

/// Length of a wrapped content key: the key plus its authentication tag
pub const WRAPPED_KEY_LEN: usize = KEY_LEN + TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub(crate) version: u32,
    pub(crate) kdf: KdfParams,
    #[serde(with = "b64")]
    pub(crate) salt: Vec<u8>,
    #[serde(with = "b64")]
    pub(crate) nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub(crate) wrapped_content_key: Vec<u8>,
    #[serde(with = "b64")]
    pub(crate) verifier: Vec<u8>,
}

impl Envelope {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    /// Salt fed to key derivation. Fixed for the lifetime of the envelope.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Nonce currently bound to the wrapped content key.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// The content key, sealed under the password-derived wrap key.
    pub fn wrapped_content_key(&self) -> &[u8] {
        &self.wrapped_content_key
    }

    /// Password verifier (second half of the derived key).
    pub fn verifier(&self) -> &[u8] {
        &self.verifier
    }

    /// Returns a copy carrying a new (nonce, wrapped key) pair. Everything
    /// else, including the salt, is preserved.
    pub(crate) fn rewrapped(&self, nonce: [u8; NONCE_LEN], wrapped_content_key: Vec<u8>) -> Self {
        Self {
            nonce: nonce.to_vec(),
            wrapped_content_key,
            ..self.clone()
        }
    }

    /// The nonce as a fixed-size array.
    pub(crate) fn nonce_array(&self) -> Result<[u8; NONCE_LEN]> {
        self.nonce
            .as_slice()
            .try_into()
            .map_err(|_| corrupted(format!("nonce must be {} bytes", NONCE_LEN)))
    }

    /// Check structural validity of a loaded envelope.
    pub fn validate(&self) -> Result<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(PassboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedVersion,
                format!("unsupported envelope version {}", self.version),
            ));
        }
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&self.salt.len()) {
            return Err(corrupted(format!(
                "salt length {} out of range",
                self.salt.len()
            )));
        }
        self.nonce_array()?;
        if self.verifier.len() != KEY_LEN {
            return Err(corrupted(format!("verifier must be {} bytes", KEY_LEN)));
        }
        if self.wrapped_content_key.len() != WRAPPED_KEY_LEN {
            return Err(corrupted(format!(
                "wrapped content key must be {} bytes",
                WRAPPED_KEY_LEN
            )));
        }
        self.kdf.validate().map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::EnvelopeCorrupted,
                "envelope holds invalid key derivation parameters",
                e,
            )
        })
    }
}

pub(crate) fn corrupted(msg: impl Into<String>) -> PassboxError {
    PassboxError::with_kind(ErrorCategory::Internal, ErrorKind::EnvelopeCorrupted, msg)
}

mod b64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            version: ENVELOPE_VERSION,
            kdf: KdfParams::pbkdf2(1000),
            salt: vec![1u8; 8],
            nonce: vec![2u8; NONCE_LEN],
            wrapped_content_key: vec![3u8; WRAPPED_KEY_LEN],
            verifier: vec![4u8; KEY_LEN],
        }
    }

    #[test]
    fn test_valid_sample() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["kdf"]["algorithm"], "pbkdf2-sha256");
        assert_eq!(json["kdf"]["iterations"], 1000);
        assert_eq!(json["salt"], "AQEBAQEBAQE=");
        assert!(json["nonce"].is_string());
        assert!(json["wrappedContentKey"].is_string());
        assert!(json["verifier"].is_string());

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_bad_base64_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["salt"] = serde_json::Value::String("not base64!".into());
        assert!(serde_json::from_value::<Envelope>(json).is_err());
    }

    #[test]
    fn test_future_version() {
        let mut env = sample();
        env.version = 2;
        assert_eq!(
            env.validate().unwrap_err().kind,
            Some(ErrorKind::UnsupportedVersion)
        );
    }

    #[test]
    fn test_bad_lengths() {
        let cases: [fn(&mut Envelope); 8] = [
            |e: &mut Envelope| e.salt.clear(),
            |e: &mut Envelope| e.salt = vec![0u8; MAX_SALT_LEN + 1],
            |e: &mut Envelope| e.nonce.truncate(NONCE_LEN - 1),
            |e: &mut Envelope| e.verifier.push(0),
            |e: &mut Envelope| e.wrapped_content_key.truncate(KEY_LEN),
            |e: &mut Envelope| e.kdf = KdfParams::pbkdf2(0),
            |e: &mut Envelope| e.kdf = KdfParams::pbkdf2(u32::MAX),
            |e: &mut Envelope| e.kdf = KdfParams::Scrypt { log_n: 40, r: 8, p: 1 },
        ];
        for mutate in cases {
            let mut env = sample();
            mutate(&mut env);
            assert_eq!(
                env.validate().unwrap_err().kind,
                Some(ErrorKind::EnvelopeCorrupted)
            );
        }
    }

    #[test]
    fn test_rewrapped_keeps_salt_and_verifier() {
        let env = sample();
        let next = env.rewrapped([9u8; NONCE_LEN], vec![8u8; WRAPPED_KEY_LEN]);
        assert_eq!(next.salt(), env.salt());
        assert_eq!(next.verifier(), env.verifier());
        assert_eq!(next.kdf(), env.kdf());
        assert_eq!(next.nonce(), &[9u8; NONCE_LEN][..]);
        assert_eq!(next.wrapped_content_key(), &[8u8; WRAPPED_KEY_LEN][..]);
        // the original is untouched
        assert_eq!(env.nonce(), &[2u8; NONCE_LEN][..]);
    }
}
