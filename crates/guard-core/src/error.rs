//! Error types for the integrity guard

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("signature record missing: {}", .0.display())]
    RecordMissing(PathBuf),

    #[error("signature record corrupt: {} ({reason})", path.display())]
    RecordCorrupt { path: PathBuf, reason: String },

    #[error("empty passphrase")]
    EmptyPassphrase,

    #[error("content mismatch: protected file differs from the installed digest")]
    ContentMismatch,

    #[error("signature mismatch: wrong passphrase or forged record")]
    SignatureMismatch,

    #[error("could not change write permission on {}: {reason}", path.display())]
    PermissionChangeFailed { path: PathBuf, reason: String },

    #[error("install copy does not match protected file: {}", .0.display())]
    CopyMismatch(PathBuf),

    #[error("passphrase unavailable: {0}")]
    Passphrase(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GuardError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            GuardError::NotFound(path)
        } else {
            GuardError::Io { path, source }
        }
    }

    /// Integrity failures are distinct from operational ones so callers can
    /// tell "the file was touched" apart from "the guard could not run".
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            GuardError::ContentMismatch | GuardError::SignatureMismatch
        )
    }

    /// Process exit status: 2 for integrity failures, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        if self.is_integrity_failure() {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn not_found_io_is_promoted() {
        let err = GuardError::io("/nope", Error::new(ErrorKind::NotFound, "gone"));
        assert!(matches!(err, GuardError::NotFound(_)));
        let err = GuardError::io("/nope", Error::new(ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(err, GuardError::Io { .. }));
    }

    #[test]
    fn exit_codes_split_integrity_from_operational() {
        assert_eq!(GuardError::ContentMismatch.exit_code(), 2);
        assert_eq!(GuardError::SignatureMismatch.exit_code(), 2);
        assert_eq!(GuardError::EmptyPassphrase.exit_code(), 1);
        assert_eq!(GuardError::RecordMissing(PathBuf::from("x")).exit_code(), 1);
    }
}
