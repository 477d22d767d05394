//! On-disk signature record.
//!
//! Layout inside the install directory:
//!
//! ```text
//! file.sha256      lowercase hex digest, newline-terminated
//! signature.hmac   lowercase hex tag, newline-terminated
//! <file name>      content copy of the protected file
//! ```
//!
//! Every artifact is written to a staging file in the same directory, synced,
//! then renamed over the target, so a reader sees either the old or the new
//! artifact and never a half-written one.

use crate::crypto::AuthenticationTag;
use crate::digest::ContentDigest;
use crate::error::{GuardError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub const DIGEST_FILE: &str = "file.sha256";
pub const TAG_FILE: &str = "signature.hmac";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRecord {
    pub digest: ContentDigest,
    pub tag: AuthenticationTag,
}

pub struct SignatureStore {
    dir: PathBuf,
}

impl SignatureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn digest_path(&self) -> PathBuf {
        self.dir.join(DIGEST_FILE)
    }

    pub fn tag_path(&self) -> PathBuf {
        self.dir.join(TAG_FILE)
    }

    pub fn exists(&self) -> bool {
        self.digest_path().is_file() && self.tag_path().is_file()
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| GuardError::io(&self.dir, e))
    }

    /// Overwrites any previous record. The old tag is removed first, then the
    /// digest and tag are written in that order, so an interrupted save loads
    /// as `RecordMissing` instead of pairing an old tag with a new digest.
    pub fn save(&self, record: &SignatureRecord) -> Result<()> {
        self.ensure_dir()?;
        self.clear_tag()?;
        self.write_digest(&record.digest)?;
        self.write_tag(&record.tag)?;
        debug!(dir = %self.dir.display(), "signature record written");
        Ok(())
    }

    fn clear_tag(&self) -> Result<()> {
        let path = self.tag_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GuardError::io(path, e)),
        }
    }

    fn write_digest(&self, digest: &ContentDigest) -> Result<()> {
        let line = format!("{}\n", digest.to_hex());
        self.write_atomic(&self.digest_path(), |f| f.write_all(line.as_bytes()))
    }

    fn write_tag(&self, tag: &AuthenticationTag) -> Result<()> {
        let line = format!("{}\n", tag.to_hex());
        self.write_atomic(&self.tag_path(), |f| f.write_all(line.as_bytes()))
    }

    pub fn load(&self) -> Result<SignatureRecord> {
        let digest_path = self.digest_path();
        let tag_path = self.tag_path();
        let digest_text = read_artifact(&digest_path)?;
        let tag_text = read_artifact(&tag_path)?;
        let digest = ContentDigest::from_hex(first_line(&digest_text)).map_err(|reason| {
            GuardError::RecordCorrupt {
                path: digest_path,
                reason,
            }
        })?;
        let tag = AuthenticationTag::from_hex(first_line(&tag_text)).map_err(|reason| {
            GuardError::RecordCorrupt {
                path: tag_path,
                reason,
            }
        })?;
        Ok(SignatureRecord { digest, tag })
    }

    /// Streams `source` into the install directory under its own file name.
    pub fn store_copy(&self, source: &Path) -> Result<PathBuf> {
        self.ensure_dir()?;
        let name = source
            .file_name()
            .ok_or_else(|| GuardError::Config(format!("no file name in {}", source.display())))?;
        let dest = self.dir.join(name);
        let mut input = File::open(source).map_err(|e| GuardError::io(source, e))?;
        self.write_atomic(&dest, |f| io::copy(&mut input, f).map(|_| ()))?;
        debug!(from = %source.display(), to = %dest.display(), "content copy written");
        Ok(dest)
    }

    fn write_atomic<F>(&self, target: &Path, fill: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        let mut staging = NamedTempFile::new_in(&self.dir).map_err(|e| GuardError::io(&self.dir, e))?;
        fill(staging.as_file_mut()).map_err(|e| GuardError::io(target, e))?;
        staging
            .as_file()
            .sync_all()
            .map_err(|e| GuardError::io(target, e))?;
        staging
            .persist(target)
            .map_err(|e| GuardError::io(target, e.error))?;
        Ok(())
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).map_err(|_| GuardError::RecordCorrupt {
            path: path.to_path_buf(),
            reason: "not utf-8 text".into(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(GuardError::RecordMissing(path.to_path_buf()))
        }
        Err(e) => Err(GuardError::io(path, e)),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
