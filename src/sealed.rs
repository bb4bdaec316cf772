//! Binary format of data ciphertexts
//!
//! The data nonce travels with the ciphertext, not in the envelope:
//! - nonce: 24 bytes
//! - length: 8 bytes (big-endian signed int64)
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)
//!
//! Files carry the text form: `passbox<version>:` followed by the binary
//! layout in base64url without padding. It contains no whitespace, so it
//! can be pasted into URLs and shell arguments unescaped.

use crate::cipher::{NONCE_LEN, TAG_LEN};
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::mem::size_of;

/// Leading tag of the text form; the format version follows it directly
const TEXT_TAG: &str = "passbox";

/// Version of the binary layout written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// A data ciphertext and the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedData {
    pub nonce: [u8; NONCE_LEN],
    pub sealed_box: Vec<u8>,
}

fn format_error(kind: ErrorKind, msg: &str) -> PassboxError {
    PassboxError::with_kind(ErrorCategory::User, kind, msg)
}

impl SealedData {
    pub fn to_bytes(&self) -> Vec<u8> {
        let sealed_box_len = self.sealed_box.len() as i64;
        let mut output = Vec::with_capacity(NONCE_LEN + size_of::<i64>() + self.sealed_box.len());
        output.extend_from_slice(&self.nonce);
        output.extend_from_slice(&sealed_box_len.to_be_bytes());
        output.extend_from_slice(&self.sealed_box);
        output
    }

    /// Parse the binary layout. No decryption happens here.
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let mut pos = 0;

        if input.len() < pos + NONCE_LEN {
            return Err(format_error(
                ErrorKind::TruncatedInput,
                "input likely truncated while reading nonce",
            ));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&input[pos..pos + NONCE_LEN]);
        pos += NONCE_LEN;

        if input.len() < pos + size_of::<i64>() {
            return Err(format_error(
                ErrorKind::TruncatedInput,
                "input likely truncated while reading sealed box length",
            ));
        }
        let mut length_bytes = [0u8; size_of::<i64>()];
        length_bytes.copy_from_slice(&input[pos..pos + size_of::<i64>()]);
        let sealed_box_len = i64::from_be_bytes(length_bytes);
        pos += size_of::<i64>();

        if sealed_box_len < 0 {
            return Err(format_error(
                ErrorKind::BinaryFormat,
                "negative sealed box length (when interpreted as a big-endian i64)",
            ));
        }
        // *Valid* input can fail this check if the platform's usize is small.
        let sealed_box_len = usize::try_from(sealed_box_len).map_err(|_| {
            format_error(
                ErrorKind::BinaryFormat,
                "sealed box length exceeds this system's address space",
            )
        })?;

        if sealed_box_len < TAG_LEN {
            return Err(format_error(
                ErrorKind::BinaryFormat,
                "sealed box shorter than its authentication tag",
            ));
        }
        if input.len() - pos < sealed_box_len {
            return Err(format_error(
                ErrorKind::TruncatedInput,
                "truncated or corrupt input; claimed length greater than available input",
            ));
        }
        let sealed_box = input[pos..pos + sealed_box_len].to_vec();
        pos += sealed_box_len;

        if pos < input.len() {
            return Err(format_error(
                ErrorKind::TrailingData,
                "invalid input: unexpected data after sealed box",
            ));
        }

        Ok(Self { nonce, sealed_box })
    }

    /// Text form, e.g. `passbox1:AAAB...`.
    pub fn to_armored(&self) -> String {
        format!(
            "{}{}:{}",
            TEXT_TAG,
            FORMAT_VERSION,
            URL_SAFE_NO_PAD.encode(self.to_bytes())
        )
    }

    /// Parse the text form, checking both the header and the binary layout.
    ///
    /// Surrounding whitespace, such as a trailing newline added by an
    /// editor, is ignored.
    pub fn from_armored(text: &str) -> Result<Self> {
        let text = text.trim();
        let (header, body) = text
            .split_once(':')
            .ok_or_else(|| armor_error(ErrorKind::ArmoringInvalid, "missing passbox header"))?;
        let version = header
            .strip_prefix(TEXT_TAG)
            .ok_or_else(|| armor_error(ErrorKind::ArmoringInvalid, "not passbox ciphertext"))?;

        match version.parse::<u32>() {
            Ok(FORMAT_VERSION) => {}
            Ok(other) => {
                return Err(armor_error(
                    ErrorKind::ArmoringFromFuture,
                    format!("ciphertext format version {} is not supported", other),
                ));
            }
            Err(_) => {
                return Err(armor_error(
                    ErrorKind::ArmoringInvalid,
                    "malformed ciphertext format version",
                ));
            }
        }

        let bytes = URL_SAFE_NO_PAD.decode(body).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                "ciphertext body is not valid base64url",
                e,
            )
        })?;
        Self::from_bytes(&bytes)
    }
}

fn armor_error(kind: ErrorKind, msg: impl Into<String>) -> PassboxError {
    PassboxError::with_kind(ErrorCategory::User, kind, msg)
}
