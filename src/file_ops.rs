//! File encryption/decryption operations
//!
//! Glue between the core and its collaborators: passwords come from a
//! [`PasswordReader`], envelopes from an [`EnvelopeStore`], and data
//! ciphertexts are written in the text form of [`SealedData`].

use crate::config::EncryptionConfig;
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use crate::password::PasswordReader;
use crate::password_encryption::PasswordEncryption;
use crate::sealed::SealedData;
use crate::store::{EnvelopeStore, io_error, write_atomic};
use std::fs;
use std::path::Path;

/// Create a new envelope protected by a password and save it.
///
/// Refuses to replace an envelope that already exists in `store`, since
/// that would make every ciphertext sealed under it unrecoverable.
pub fn init_envelope(
    store: &dyn EnvelopeStore,
    password_reader: &mut dyn PasswordReader,
    config: &EncryptionConfig,
) -> Result<()> {
    if store.exists() {
        return Err(PassboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeExists,
            "an envelope already exists; refusing to overwrite it",
        ));
    }
    let password = password_reader.read_password()?;
    let encryption = PasswordEncryption::create(&password, config)
        .map_err(|e| e.with_context("failed to create envelope"))?;
    store
        .save(encryption.envelope())
        .map_err(|e| e.with_context("failed to save envelope"))
}

/// Encrypt a file under the stored envelope
///
/// Reads plaintext from `input_path` and writes the ciphertext text form to
/// `output_path` (mode 0o600 on Unix systems). The envelope is re-wrapped
/// with a fresh nonce and saved back to `store` after the output is written.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    store: &dyn EnvelopeStore,
    password_reader: &mut dyn PasswordReader,
) -> Result<()> {
    let plaintext = fs::read(input_path)
        .map_err(|e| io_error(e, format!("failed to read from {}", input_path.display())))?;
    let envelope = store
        .load()
        .map_err(|e| e.with_context("failed to load envelope"))?;
    let password = password_reader.read_password()?;

    let mut encryption = PasswordEncryption::from_envelope(envelope)?;
    let sealed = encryption
        .encrypt_sealed(&plaintext, &password)
        .map_err(|e| e.with_context("encryption failed"))?;

    write_atomic(output_path, sealed.to_armored().as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    store
        .save(encryption.envelope())
        .map_err(|e| e.with_context("failed to save envelope"))
}

/// Decrypt a file using the stored envelope
///
/// Reads the ciphertext text form from `input_path` and writes the plaintext to
/// `output_path` (mode 0o600 on Unix systems).
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    store: &dyn EnvelopeStore,
    password_reader: &mut dyn PasswordReader,
) -> Result<()> {
    let armored = fs::read_to_string(input_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            PassboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                "input file is not valid UTF-8",
                e,
            )
        } else {
            io_error(e, format!("failed to read from {}", input_path.display()))
        }
    })?;
    let sealed = SealedData::from_armored(&armored)
        .map_err(|e| e.with_context(format!("{} is not passbox ciphertext", input_path.display())))?;
    let envelope = store
        .load()
        .map_err(|e| e.with_context("failed to load envelope"))?;
    let password = password_reader.read_password()?;

    let encryption = PasswordEncryption::from_envelope(envelope)?;
    let plaintext = encryption
        .decrypt_sealed(&sealed, &password)
        .map_err(|e| e.with_context("failed to decrypt"))?;
    write_atomic(output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))
}

/// Check a password against the stored envelope without decrypting anything.
pub fn verify_password(
    store: &dyn EnvelopeStore,
    password_reader: &mut dyn PasswordReader,
) -> Result<()> {
    let envelope = store
        .load()
        .map_err(|e| e.with_context("failed to load envelope"))?;
    let password = password_reader.read_password()?;
    PasswordEncryption::from_envelope(envelope)?.verify_password(&password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;
    use crate::password::ConstantPasswordReader;
    use crate::store::JsonFileStore;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn config() -> EncryptionConfig {
        EncryptionConfig::with_kdf(KdfParams::pbkdf2(1000))
    }

    fn init(temp_dir: &TempDir, password: &str) -> JsonFileStore {
        let store = JsonFileStore::new(temp_dir.path().join("envelope.json"));
        let mut reader = ConstantPasswordReader::new(password);
        init_envelope(&store, &mut reader, &config()).unwrap();
        store
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "test password");
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("plain.txt.passbox");
        let decrypted_path = temp_dir.path().join("decrypted.txt");

        let plaintext = b"Hello, passbox!";
        fs::write(&plain_path, plaintext).unwrap();

        let mut reader = ConstantPasswordReader::new("test password");
        encrypt_file(&plain_path, &crypt_path, &store, &mut reader).unwrap();
        assert!(
            fs::read_to_string(&crypt_path)
                .unwrap()
                .starts_with("passbox1:")
        );

        decrypt_file(&crypt_path, &decrypted_path, &store, &mut reader).unwrap();
        assert_eq!(fs::read(&decrypted_path).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_rewraps_stored_envelope() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "pw");
        let before = store.load().unwrap();

        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"data").unwrap();
        let mut reader = ConstantPasswordReader::new("pw");
        encrypt_file(&plain_path, &temp_dir.path().join("out"), &store, &mut reader).unwrap();

        let after = store.load().unwrap();
        assert_ne!(after.nonce(), before.nonce());
        assert_ne!(after.wrapped_content_key(), before.wrapped_content_key());
        assert_eq!(after.salt(), before.salt());
    }

    #[test]
    fn test_earlier_ciphertexts_stay_readable() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "pw");
        let plain_path = temp_dir.path().join("plain.txt");
        let first = temp_dir.path().join("first.passbox");
        let second = temp_dir.path().join("second.passbox");
        let out = temp_dir.path().join("out.txt");
        let mut reader = ConstantPasswordReader::new("pw");

        fs::write(&plain_path, b"first").unwrap();
        encrypt_file(&plain_path, &first, &store, &mut reader).unwrap();
        fs::write(&plain_path, b"second").unwrap();
        encrypt_file(&plain_path, &second, &store, &mut reader).unwrap();

        decrypt_file(&first, &out, &store, &mut reader).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"first");
        decrypt_file(&second, &out, &store, &mut reader).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"second");
    }

    #[test]
    fn test_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "correct");
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("crypt.passbox");
        fs::write(&plain_path, b"secret").unwrap();

        let mut reader = ConstantPasswordReader::new("correct");
        encrypt_file(&plain_path, &crypt_path, &store, &mut reader).unwrap();
        let before = store.load().unwrap();

        let mut wrong = ConstantPasswordReader::new("wrong");
        let err = decrypt_file(&crypt_path, &temp_dir.path().join("out"), &store, &mut wrong)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::WrongPassword));

        let err = encrypt_file(&plain_path, &crypt_path, &store, &mut wrong).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::WrongPassword));
        assert_eq!(store.load().unwrap(), before);

        let err = verify_password(&store, &mut wrong).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::WrongPassword));
        verify_password(&store, &mut reader).unwrap();
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "pw");
        let before = store.load().unwrap();

        let mut reader = ConstantPasswordReader::new("other");
        let err = init_envelope(&store, &mut reader, &config()).unwrap_err();
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.kind, Some(ErrorKind::EnvelopeExists));
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "test");
        let plain_path = temp_dir.path().join("plain.txt");
        let crypt_path = temp_dir.path().join("crypt.passbox");
        fs::write(&plain_path, b"test").unwrap();

        let mut reader = ConstantPasswordReader::new("test");
        encrypt_file(&plain_path, &crypt_path, &store, &mut reader).unwrap();

        let permissions = fs::metadata(&crypt_path).unwrap().permissions();
        assert_eq!(permissions.mode() & 0o777, 0o600);
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "test");
        let plain_path = temp_dir.path().join("empty.txt");
        let crypt_path = temp_dir.path().join("empty.passbox");
        let decrypted_path = temp_dir.path().join("decrypted.txt");
        fs::write(&plain_path, b"").unwrap();

        let mut reader = ConstantPasswordReader::new("test");
        encrypt_file(&plain_path, &crypt_path, &store, &mut reader).unwrap();
        decrypt_file(&crypt_path, &decrypted_path, &store, &mut reader).unwrap();

        assert_eq!(fs::read(&decrypted_path).unwrap(), b"");
    }

    #[test]
    fn test_decrypt_not_passbox_text() {
        let temp_dir = TempDir::new().unwrap();
        let store = init(&temp_dir, "test");
        let crypt_path = temp_dir.path().join("junk");
        fs::write(&crypt_path, b"hello").unwrap();

        let mut reader = ConstantPasswordReader::new("test");
        let err = decrypt_file(&crypt_path, &temp_dir.path().join("out"), &store, &mut reader)
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }
}
