//! Envelope persistence
//!
//! The envelope is not secret without the password, but it is written with
//! owner-only permissions anyway and always replaced atomically: a crash
//! leaves either the previous envelope or the new one, never a mix.

use crate::envelope::Envelope;
use crate::error::{ErrorCategory, ErrorKind, PassboxError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage collaborator for envelopes
pub trait EnvelopeStore {
    fn exists(&self) -> bool;
    fn load(&self) -> Result<Envelope>;
    fn save(&self, envelope: &Envelope) -> Result<()>;
}

/// Stores one envelope as pretty-printed JSON in a file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the envelope file.
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| {
            io_error(
                e,
                format!("failed to remove {}", self.path.display()),
            )
        })
    }
}

impl EnvelopeStore for JsonFileStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<Envelope> {
        let data = fs::read(&self.path)
            .map_err(|e| io_error(e, format!("failed to read from {}", self.path.display())))?;
        let envelope: Envelope = serde_json::from_slice(&data).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Serialization,
                format!("{} is not a valid envelope", self.path.display()),
                e,
            )
        })?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn save(&self, envelope: &Envelope) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(envelope).map_err(|e| {
            PassboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to encode envelope",
                e,
            )
        })?;
        json.push(b'\n');

        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), "saved envelope");
        Ok(())
    }
}

/// Replace `path` with `contents` via tempfile + fsync + rename.
///
/// The file ends up with mode 0o600 on Unix systems.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error(e, "failed to create tempfile".to_owned()))?;

    temp_file
        .write_all(contents)
        .map_err(|e| io_error(e, "failed to write to tempfile".to_owned()))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error(e, "failed to flush tempfile".to_owned()))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error(e, "failed to sync file prior to rename".to_owned()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| io_error(e, "failed to get tempfile metadata".to_owned()))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| io_error(e, "failed to set tempfile permissions".to_owned()))?;
    }

    temp_file.persist(path).map_err(|e| {
        PassboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

pub(crate) fn io_error(err: io::Error, msg: String) -> PassboxError {
    let category = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::User,
        _ => ErrorCategory::Internal,
    };
    PassboxError::with_kind_and_source(category, ErrorKind::Io, msg, err)
}
