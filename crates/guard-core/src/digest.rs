//! Streaming SHA-256 content digest of the protected file.

use crate::error::{GuardError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DIGEST_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
const READ_BUFFER: usize = 8192;

/// SHA-256 of a file's bytes at capture time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Key-derivation salt. Bound to content so any edit moves the salt.
    pub fn salt(&self) -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&self.0[..SALT_LEN]);
        salt
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let bytes: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("expected {DIGEST_LEN} bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn digest_file(path: &Path) -> Result<ContentDigest> {
    let mut file = File::open(path).map_err(|e| GuardError::io(path, e))?;
    digest_reader(&mut file).map_err(|e| GuardError::io(path, e))
}

pub fn digest_reader<R: Read>(reader: &mut R) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn known_vector() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"abc").unwrap();
        let digest = digest_file(f.path()).unwrap();
        assert_eq!(
            digest.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn repeated_calls_agree() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello-world").unwrap();
        assert_eq!(digest_file(f.path()).unwrap(), digest_file(f.path()).unwrap());
    }

    #[test]
    fn streams_past_buffer_boundary() {
        let data = vec![0x5au8; READ_BUFFER * 3 + 17];
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        let expected: [u8; 32] = Sha256::digest(&data).into();
        assert_eq!(digest_file(f.path()).unwrap().as_bytes(), &expected);
    }

    #[test]
    fn single_byte_change_moves_digest_and_salt() {
        let a = digest_reader(&mut &b"hello-world"[..]).unwrap();
        let b = digest_reader(&mut &b"hello-worle"[..]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.salt(), b.salt());
        assert_eq!(&a.salt()[..], &a.as_bytes()[..SALT_LEN]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = digest_file(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, GuardError::NotFound(_)));
    }

    #[test]
    fn hex_decode_rejects_wrong_length() {
        assert!(ContentDigest::from_hex("abcd").is_err());
        assert!(ContentDigest::from_hex("zz").is_err());
        let d = digest_reader(&mut &b"x"[..]).unwrap();
        assert_eq!(ContentDigest::from_hex(&d.to_hex()).unwrap(), d);
    }
}
