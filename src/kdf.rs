//! Password-based key derivation
//!
//! A password and salt are stretched into a single derived key which is
//! then split positionally in half:
//! - the first half (`k2`) wraps and unwraps the content key
//! - the second half (`k3`) is the verifier stored in the envelope
//!
//! Two functions are supported: PBKDF2-HMAC-SHA256 (the default) and scrypt.
//! The chosen parameters are stored in the envelope so that every later
//! operation re-derives the same pair.

use crate::cipher::KEY_LEN;
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Default PBKDF2 iteration count
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Default scrypt log2(N) parameter (CPU/memory cost, N = 32768)
pub const DEFAULT_SCRYPT_LOG_N: u8 = 15;

/// Default scrypt r parameter (block size)
pub const DEFAULT_SCRYPT_R: u32 = 8;

/// Default scrypt p parameter (parallelization)
pub const DEFAULT_SCRYPT_P: u32 = 1;

/// Length of the derived key before it is split into wrap key and verifier
pub const DERIVED_LEN: usize = 2 * KEY_LEN;

/// Highest PBKDF2 iteration count accepted from configuration or a stored
/// envelope
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Upper bound on scrypt's working memory (128 * r * N bytes)
pub const MAX_SCRYPT_MEMORY: u64 = 1 << 30;

/// Highest scrypt parallelization parameter accepted
pub const MAX_SCRYPT_P: u32 = 16;

/// Output length recorded in scrypt params. Only used by scrypt's PHC string
/// support; the actual output length is the size of the output buffer.
const SCRYPT_PARAMS_LEN: usize = 32;

/// Key derivation function and its cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA256.
    Pbkdf2Sha256 { iterations: u32 },
    /// scrypt with cost N = 2^log_n.
    #[serde(rename_all = "camelCase")]
    Scrypt { log_n: u8, r: u32, p: u32 },
}

impl KdfParams {
    /// PBKDF2-HMAC-SHA256 with the given iteration count.
    pub fn pbkdf2(iterations: u32) -> Self {
        Self::Pbkdf2Sha256 { iterations }
    }

    /// scrypt with N=32768, r=8, p=1.
    pub fn scrypt_default() -> Self {
        Self::Scrypt {
            log_n: DEFAULT_SCRYPT_LOG_N,
            r: DEFAULT_SCRYPT_R,
            p: DEFAULT_SCRYPT_P,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 { .. } => "pbkdf2-sha256",
            Self::Scrypt { .. } => "scrypt",
        }
    }

    /// Check that the parameters are usable without running the function.
    ///
    /// Cost is bounded too: parameters read from a stored envelope are
    /// untrusted.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Pbkdf2Sha256 { iterations } => {
                if iterations == 0 {
                    return Err(derivation_error("pbkdf2 iteration count must be at least 1"));
                }
                if iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(derivation_error(format!(
                        "pbkdf2 iteration count {} exceeds the maximum of {}",
                        iterations, MAX_PBKDF2_ITERATIONS
                    )));
                }
                Ok(())
            }
            Self::Scrypt { log_n, r, p } => {
                if p > MAX_SCRYPT_P {
                    return Err(derivation_error(format!(
                        "scrypt p={} exceeds the maximum of {}",
                        p, MAX_SCRYPT_P
                    )));
                }
                match scrypt_memory(log_n, r) {
                    Some(bytes) if bytes <= MAX_SCRYPT_MEMORY => {}
                    _ => {
                        return Err(derivation_error(format!(
                            "scrypt logN={} r={} needs more than {} bytes of memory",
                            log_n, r, MAX_SCRYPT_MEMORY
                        )));
                    }
                }
                scrypt_params(log_n, r, p)?;
                Ok(())
            }
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::pbkdf2(DEFAULT_PBKDF2_ITERATIONS)
    }
}

fn derivation_error(msg: impl Into<String>) -> PassboxError {
    PassboxError::with_kind(ErrorCategory::Internal, ErrorKind::DerivationFailed, msg)
}

/// Bytes of memory scrypt needs for its V array, or None on overflow.
fn scrypt_memory(log_n: u8, r: u32) -> Option<u64> {
    let n = 1u64.checked_shl(u32::from(log_n))?;
    128u64.checked_mul(u64::from(r))?.checked_mul(n)
}

fn scrypt_params(log_n: u8, r: u32, p: u32) -> Result<scrypt::Params> {
    scrypt::Params::new(log_n, r, p, SCRYPT_PARAMS_LEN)
        .map_err(|e| derivation_error(format!("invalid scrypt params: {}", e)))
}

/// Derive `output_len` bytes from `password` and `salt`.
///
/// Deterministic for fixed inputs. Fails with
/// [`ErrorKind::DerivationFailed`] only on invalid parameters.
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if output_len == 0 {
        return Err(derivation_error("derived key length must be non-zero"));
    }
    if salt.is_empty() {
        return Err(derivation_error("salt must be non-empty"));
    }

    params.validate()?;

    let mut output = Zeroizing::new(vec![0u8; output_len]);
    match *params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
        }
        KdfParams::Scrypt { log_n, r, p } => {
            let scrypt_params = scrypt_params(log_n, r, p)?;
            scrypt::scrypt(password, salt, &scrypt_params, &mut output)
                .map_err(|e| derivation_error(format!("scrypt key derivation failed: {}", e)))?;
        }
    }

    Ok(output)
}

/// Split a slice in half by position.
///
/// If the length is odd, the extra element goes to the second half.
pub fn split_in_half<T>(items: &[T]) -> (&[T], &[T]) {
    items.split_at(items.len() / 2)
}

/// The two password-derived sub-keys for one operation.
///
/// Never persisted. Both halves are wiped on drop.
pub struct DerivedKeys {
    wrap_key: Zeroizing<[u8; KEY_LEN]>,
    verifier: Zeroizing<[u8; KEY_LEN]>,
}

impl DerivedKeys {
    /// Run the KDF once and split its output into wrap key and verifier.
    pub fn derive(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<Self> {
        let output = derive(password, salt, params, DERIVED_LEN)?;
        let (k2, k3) = split_in_half(&output);

        let mut wrap_key = Zeroizing::new([0u8; KEY_LEN]);
        wrap_key.copy_from_slice(k2);
        let mut verifier = Zeroizing::new([0u8; KEY_LEN]);
        verifier.copy_from_slice(k3);

        Ok(Self { wrap_key, verifier })
    }

    /// Key used to wrap and unwrap the content key (`k2`).
    pub fn wrap_key(&self) -> &[u8; KEY_LEN] {
        &self.wrap_key
    }

    /// Verifier to be stored in a new envelope (`k3`).
    pub fn verifier(&self) -> &[u8] {
        &self.verifier[..]
    }

    /// Constant-time comparison of this verifier against a stored one.
    pub fn verifier_matches(&self, stored: &[u8]) -> bool {
        self.verifier[..].ct_eq(stored).into()
    }
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys").finish_non_exhaustive()
    }
}
