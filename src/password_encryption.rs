//! Password-based envelope encryption
//!
//! # How it works
//!
//! Creation:
//! 1. Generate a random content key, a random nonce and a random salt.
//! 2. Derive a key from the password and salt and split it in half into
//!    the wrap key (`k2`) and the verifier (`k3`).
//! 3. Seal the content key under the wrap key with the nonce.
//! 4. Store the wrapped content key, the verifier, the salt and the nonce.
//!
//! Every operation re-derives (`k2`, `k3`), compares `k3` with the stored
//! verifier in constant time, and only then unwraps the content key.
//!
//! Each encryption draws two fresh nonces: one to re-wrap the content key
//! (replacing the envelope's nonce) and one to seal the caller's data,
//! which travels inside the returned ciphertext. The envelope is replaced
//! in one assignment only after both seals succeed.
//!
//! Never store the wrap key or the unwrapped content key. Doing either
//! breaks the security of the scheme.

use crate::cipher::{BoundCipher, KEY_LEN, NONCE_LEN};
use crate::config::EncryptionConfig;
use crate::envelope::{ENVELOPE_VERSION, Envelope, corrupted};
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use crate::kdf::DerivedKeys;
use crate::password::Password;
use crate::random::{OsRandom, RandomSource};
use crate::sealed::SealedData;
use std::fmt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// The unwrapped content key. Wiped on drop.
pub struct ContentKey(Zeroizing<[u8; KEY_LEN]>);

impl ContentKey {
    fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(corrupted("unwrapped content key has the wrong length"));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// Owns one [`Envelope`] and performs all operations against it.
///
/// `encrypt` is a read-modify-write of the envelope. Callers sharing one
/// logical envelope across threads must serialize access themselves.
pub struct PasswordEncryption<R: RandomSource = OsRandom> {
    envelope: Envelope,
    rng: R,
}

impl PasswordEncryption<OsRandom> {
    /// Create a new envelope protected by `password`.
    pub fn create(password: &Password, config: &EncryptionConfig) -> Result<Self> {
        Self::create_with_rng(password, config, OsRandom)
    }

    /// Resume from a previously persisted envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        Self::from_envelope_with_rng(envelope, OsRandom)
    }
}

impl<R: RandomSource> PasswordEncryption<R> {
    pub fn create_with_rng(password: &Password, config: &EncryptionConfig, mut rng: R) -> Result<Self> {
        config.validate()?;

        let mut content_key = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill_bytes(&mut content_key[..])?;
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce)?;
        let salt = rng.random_bytes(config.salt_len)?;

        let keys = DerivedKeys::derive(password.as_bytes(), &salt, &config.kdf)?;
        let wrapped_content_key = BoundCipher::new(keys.wrap_key(), &nonce).seal(&content_key[..])?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            kdf: config.kdf,
            salt,
            nonce: nonce.to_vec(),
            wrapped_content_key,
            verifier: keys.verifier().to_vec(),
        };
        debug!(
            kdf = config.kdf.name(),
            salt_len = config.salt_len,
            "created password envelope"
        );

        Ok(Self { envelope, rng })
    }

    pub fn from_envelope_with_rng(envelope: Envelope, rng: R) -> Result<Self> {
        envelope.validate()?;
        Ok(Self { envelope, rng })
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Check the password against the verifier without unwrapping anything.
    pub fn verify_password(&self, password: &Password) -> Result<()> {
        self.derive_and_verify(password).map(|_| ())
    }

    /// Check the password and unwrap the content key.
    ///
    /// Fails with [`ErrorKind::WrongPassword`] on a verifier mismatch and
    /// with [`ErrorKind::EnvelopeCorrupted`] if the verifier matched but the
    /// wrapped key does not open.
    pub fn verify_and_unwrap(&self, password: &Password) -> Result<ContentKey> {
        self.unlock(password).map(|(_, content_key)| content_key)
    }

    /// Seal `data` and re-wrap the content key under a fresh nonce.
    ///
    /// Returns the binary layout described in [`SealedData`]. On any failure
    /// the envelope is left exactly as it was.
    pub fn encrypt(&mut self, data: &[u8], password: &Password) -> Result<Vec<u8>> {
        self.encrypt_sealed(data, password).map(|sealed| sealed.to_bytes())
    }

    /// Like [`encrypt`](Self::encrypt), returning the parsed form.
    pub fn encrypt_sealed(&mut self, data: &[u8], password: &Password) -> Result<SealedData> {
        let (keys, content_key) = self.unlock(password)?;
        let current_nonce = self.envelope.nonce_array()?;

        let mut wrap_nonce = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut wrap_nonce)?;
        if wrap_nonce == current_nonce {
            return Err(repeated_nonce());
        }
        let mut data_nonce = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut data_nonce)?;
        if data_nonce == wrap_nonce {
            return Err(repeated_nonce());
        }

        // Reuses the wrap key derived by unlock(); no second KDF run.
        let wrapped_content_key =
            BoundCipher::new(keys.wrap_key(), &wrap_nonce).seal(content_key.as_bytes())?;
        let sealed_box = BoundCipher::new(content_key.as_bytes(), &data_nonce).seal(data)?;

        self.envelope = self.envelope.rewrapped(wrap_nonce, wrapped_content_key);
        debug!(data_len = data.len(), "sealed data and re-wrapped content key");

        Ok(SealedData {
            nonce: data_nonce,
            sealed_box,
        })
    }

    /// Open a ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// A wrong password fails with [`ErrorKind::WrongPassword`]; a damaged or
    /// unrelated ciphertext fails with [`ErrorKind::AuthenticationFailed`].
    pub fn decrypt(&self, ciphertext: &[u8], password: &Password) -> Result<Vec<u8>> {
        let (_, content_key) = self.unlock(password)?;
        let sealed = SealedData::from_bytes(ciphertext)?;
        open_sealed(&content_key, &sealed)
    }

    /// Like [`decrypt`](Self::decrypt), for an already parsed ciphertext.
    pub fn decrypt_sealed(&self, sealed: &SealedData, password: &Password) -> Result<Vec<u8>> {
        let (_, content_key) = self.unlock(password)?;
        open_sealed(&content_key, sealed)
    }

    fn derive_and_verify(&self, password: &Password) -> Result<DerivedKeys> {
        let keys = DerivedKeys::derive(password.as_bytes(), &self.envelope.salt, &self.envelope.kdf)?;
        if !keys.verifier_matches(&self.envelope.verifier) {
            debug!("password verifier mismatch");
            return Err(PassboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::WrongPassword,
                "incorrect password",
            ));
        }
        Ok(keys)
    }

    fn unlock(&self, password: &Password) -> Result<(DerivedKeys, ContentKey)> {
        let keys = self.derive_and_verify(password)?;
        let nonce = self.envelope.nonce_array()?;

        let opened = BoundCipher::new(keys.wrap_key(), &nonce)
            .open(&self.envelope.wrapped_content_key)
            .map_err(|e| {
                warn!("verifier matched but wrapped content key failed to open");
                PassboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::EnvelopeCorrupted,
                    "envelope is corrupted: wrapped content key failed authentication",
                    e,
                )
            })?;
        let opened = Zeroizing::new(opened);
        let content_key = ContentKey::from_slice(&opened)?;

        Ok((keys, content_key))
    }
}

fn open_sealed(content_key: &ContentKey, sealed: &SealedData) -> Result<Vec<u8>> {
    BoundCipher::new(content_key.as_bytes(), &sealed.nonce).open(&sealed.sealed_box)
}

fn repeated_nonce() -> PassboxError {
    PassboxError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::RandomnessUnavailable,
        "random source produced a repeated nonce",
    )
}

impl<R: RandomSource> fmt::Debug for PasswordEncryption<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordEncryption")
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}
