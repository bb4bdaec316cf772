//! Cryptographically secure randomness

use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use rand::RngCore;
use rand::rngs::OsRng;

/// Source of cryptographically secure random bytes.
///
/// Production code uses [`OsRandom`]. The trait exists so that callers can
/// substitute a deterministic or failing source in tests; a seeded PRNG must
/// never be used outside of tests.
pub trait RandomSource {
    /// Fill `dest` entirely with random bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()>;

    /// Return `count` fresh random bytes.
    fn random_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; count];
        self.fill_bytes(&mut bytes)?;
        Ok(bytes)
    }
}

/// Random bytes from the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(dest).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::RandomnessUnavailable,
                "secure random number generator unavailable",
                e,
            )
        })
    }
}
