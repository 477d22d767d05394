//! Guard operations: install, verify, lock, unlock, run, status.
//!
//! Per (protected file, install dir) pair the lifecycle is
//! `Uninstalled -> Installed -> {Verified | Tampered | VerificationDenied}`.
//! The verdicts are per call; nothing about them is persisted.

use crate::access::{platform_guard, AccessGuard, AccessState};
use crate::config::GuardConfig;
use crate::crypto::{derive_key, sign, verify_tag};
use crate::digest::{digest_file, ContentDigest};
use crate::error::{GuardError, Result};
use crate::passphrase::{PassphraseSource, Purpose};
use crate::store::{SignatureRecord, SignatureStore};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChange {
    Applied,
    /// The OS refused; a warning was logged and the operation carried on.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub digest: ContentDigest,
    pub install_dir: PathBuf,
    pub copy_path: PathBuf,
    pub permission: PermissionChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Tampered {
        expected: ContentDigest,
        actual: ContentDigest,
    },
    VerificationDenied,
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Verdict::Verified => Ok(()),
            Verdict::Tampered { .. } => Err(GuardError::ContentMismatch),
            Verdict::VerificationDenied => Err(GuardError::SignatureMismatch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    NotInstalled,
    Matches,
    Differs,
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub protected_file: PathBuf,
    pub install_dir: PathBuf,
    pub file_present: bool,
    pub access: Option<AccessState>,
    pub record_present: bool,
    pub content: ContentStatus,
}

pub struct Guard {
    config: GuardConfig,
    store: SignatureStore,
    access: Box<dyn AccessGuard>,
}

impl Guard {
    pub fn new(config: GuardConfig) -> Result<Self> {
        Self::with_access_guard(config, platform_guard())
    }

    pub fn with_access_guard(config: GuardConfig, access: Box<dyn AccessGuard>) -> Result<Self> {
        config.validate()?;
        let store = SignatureStore::new(config.install_dir.clone());
        Ok(Self {
            config,
            store,
            access,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &SignatureStore {
        &self.store
    }

    fn protected(&self) -> &Path {
        &self.config.protected_file
    }

    fn require_protected(&self) -> Result<()> {
        if self.protected().exists() {
            Ok(())
        } else {
            Err(GuardError::NotFound(self.protected().to_path_buf()))
        }
    }

    /// Captures the current content, binds it to the passphrase and locks
    /// the file. Overwrites any earlier record in the install directory.
    pub fn install<S: PassphraseSource + ?Sized>(&self, source: &mut S) -> Result<InstallReport> {
        let digest = digest_file(self.protected())?;
        debug!(file = %self.protected().display(), digest = %digest, "captured digest");

        let copy_path = self.store.store_copy(self.protected())?;
        if digest_file(&copy_path)? != digest {
            return Err(GuardError::CopyMismatch(copy_path));
        }

        let passphrase = source.obtain(Purpose::Install)?;
        let key = derive_key(&passphrase, &digest.salt(), self.config.kdf_iterations)?;
        drop(passphrase);
        let tag = sign(&key, &digest);
        drop(key);

        self.store.save(&SignatureRecord { digest, tag })?;
        info!(
            file = %self.protected().display(),
            install_dir = %self.store.dir().display(),
            "installation complete"
        );

        let permission = self.apply(|g, p| g.set_readonly(p));
        Ok(InstallReport {
            digest,
            install_dir: self.store.dir().to_path_buf(),
            copy_path,
            permission,
        })
    }

    /// The passphrase source is consulted only once the content digest has
    /// matched; a modified file is reported as tampered without prompting.
    pub fn verify<S: PassphraseSource + ?Sized>(&self, source: &mut S) -> Result<Verdict> {
        self.require_protected()?;
        let record = self.store.load()?;
        let current = digest_file(self.protected())?;

        if current != record.digest {
            warn!(
                file = %self.protected().display(),
                expected = %record.digest,
                actual = %current,
                "content digest mismatch"
            );
            return Ok(Verdict::Tampered {
                expected: record.digest,
                actual: current,
            });
        }

        let passphrase = source.obtain(Purpose::Verify)?;
        let key = derive_key(&passphrase, &current.salt(), self.config.kdf_iterations)?;
        drop(passphrase);
        if verify_tag(&key, &current, &record.tag) {
            info!(file = %self.protected().display(), "integrity verified");
            Ok(Verdict::Verified)
        } else {
            warn!(file = %self.protected().display(), "signature mismatch");
            Ok(Verdict::VerificationDenied)
        }
    }

    pub fn lock(&self) -> Result<PermissionChange> {
        self.require_protected()?;
        Ok(self.apply(|g, p| g.set_readonly(p)))
    }

    pub fn unlock(&self) -> Result<PermissionChange> {
        self.require_protected()?;
        Ok(self.apply(|g, p| g.set_writable(p)))
    }

    fn apply<F>(&self, change: F) -> PermissionChange
    where
        F: FnOnce(&dyn AccessGuard, &Path) -> Result<()>,
    {
        match change(self.access.as_ref(), self.protected()) {
            Ok(()) => {
                debug!(file = %self.protected().display(), "permission updated");
                PermissionChange::Applied
            }
            Err(e) => {
                warn!(error = %e, "permission change failed; continuing");
                PermissionChange::Skipped
            }
        }
    }

    /// Launches the protected file as a child process and waits for it.
    /// No integrity check happens here; call `verify` first if that matters.
    pub fn run(&self, args: &[OsString]) -> Result<ExitStatus> {
        self.require_protected()?;
        let mut cmd = match &self.config.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(self.protected());
                cmd
            }
            None => Command::new(self.protected()),
        };
        cmd.args(args);
        debug!(command = ?cmd, "spawning protected file");
        cmd.status().map_err(|e| GuardError::Io {
            path: self.protected().to_path_buf(),
            source: e,
        })
    }

    /// Read-only inspection; never asks for a passphrase.
    pub fn status(&self) -> Result<StatusReport> {
        let file_present = self.protected().exists();
        let access = if file_present {
            Some(self.access.state(self.protected())?)
        } else {
            None
        };
        let record_present = self.store.exists();
        let content = if !record_present {
            ContentStatus::NotInstalled
        } else {
            match (self.store.load(), digest_file(self.protected())) {
                (Ok(record), Ok(current)) if record.digest == current => ContentStatus::Matches,
                (Ok(_), Ok(_)) => ContentStatus::Differs,
                _ => ContentStatus::Unreadable,
            }
        };
        Ok(StatusReport {
            protected_file: self.protected().to_path_buf(),
            install_dir: self.store.dir().to_path_buf(),
            file_present,
            access,
            record_present,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passphrase::{Passphrase, StaticPassphrase};
    use std::cell::Cell;
    use std::fs;
    use tempfile::tempdir;

    struct Refusing;

    impl AccessGuard for Refusing {
        fn set_readonly(&self, path: &Path) -> Result<()> {
            Err(GuardError::PermissionChangeFailed {
                path: path.to_path_buf(),
                reason: "denied".into(),
            })
        }
        fn set_writable(&self, path: &Path) -> Result<()> {
            self.set_readonly(path)
        }
        fn state(&self, _path: &Path) -> Result<AccessState> {
            Ok(AccessState::Writable)
        }
    }

    struct Counting<'a>(&'a Cell<usize>);

    impl PassphraseSource for Counting<'_> {
        fn obtain(&mut self, _purpose: Purpose) -> Result<Passphrase> {
            self.0.set(self.0.get() + 1);
            Ok(Passphrase::new("pw"))
        }
    }

    fn setup(dir: &Path) -> GuardConfig {
        let file = dir.join("protected.py");
        fs::write(&file, b"hello-world").unwrap();
        GuardConfig::new(file, dir.join("install")).with_kdf_iterations(1_000)
    }

    #[test]
    fn permission_failure_does_not_abort_install() {
        let dir = tempdir().unwrap();
        let guard = Guard::with_access_guard(setup(dir.path()), Box::new(Refusing)).unwrap();
        let report = guard.install(&mut StaticPassphrase::new("pw")).unwrap();
        assert_eq!(report.permission, PermissionChange::Skipped);
        assert!(guard.store().exists());
        assert_eq!(guard.lock().unwrap(), PermissionChange::Skipped);
        assert_eq!(guard.unlock().unwrap(), PermissionChange::Skipped);
    }

    #[test]
    fn tampered_file_never_reaches_passphrase_source() {
        let dir = tempdir().unwrap();
        let config = setup(dir.path());
        let guard = Guard::with_access_guard(config.clone(), Box::new(Refusing)).unwrap();
        let calls = Cell::new(0);
        guard.install(&mut Counting(&calls)).unwrap();
        assert_eq!(calls.get(), 1);

        fs::write(&config.protected_file, b"hello-world!").unwrap();
        let verdict = guard.verify(&mut Counting(&calls)).unwrap();
        assert!(matches!(verdict, Verdict::Tampered { .. }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn status_tracks_install_and_edit() {
        let dir = tempdir().unwrap();
        let config = setup(dir.path());
        let guard = Guard::with_access_guard(config.clone(), Box::new(Refusing)).unwrap();
        assert_eq!(guard.status().unwrap().content, ContentStatus::NotInstalled);
        guard.install(&mut StaticPassphrase::new("pw")).unwrap();
        assert_eq!(guard.status().unwrap().content, ContentStatus::Matches);
        fs::write(&config.protected_file, b"edited").unwrap();
        let status = guard.status().unwrap();
        assert_eq!(status.content, ContentStatus::Differs);
        assert!(status.file_present && status.record_present);
    }

    #[test]
    fn verdict_maps_to_error_taxonomy() {
        assert!(Verdict::Verified.into_result().is_ok());
        assert!(matches!(
            Verdict::VerificationDenied.into_result(),
            Err(GuardError::SignatureMismatch)
        ));
        let d = ContentDigest::from_bytes([0; 32]);
        assert!(matches!(
            Verdict::Tampered { expected: d, actual: d }.into_result(),
            Err(GuardError::ContentMismatch)
        ));
    }
}
