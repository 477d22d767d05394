use crate::digest::{ContentDigest, SALT_LEN};
use crate::error::{GuardError, Result};
use crate::passphrase::Passphrase;
use hmac::digest::generic_array::GenericArray;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;
use zeroize::{ZeroizeOnDrop, Zeroizing};

pub const DEFAULT_KDF_ITERATIONS: u32 = 200_000;
pub const DERIVED_KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 32;
const HMAC_BLOCK_LEN: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// PBKDF2 output. Wiped on drop and never printed.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationTag([u8; TAG_LEN]);

impl AuthenticationTag {
    pub fn from_bytes(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let bytes: [u8; TAG_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("expected {TAG_LEN} bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for AuthenticationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthenticationTag({})", self.to_hex())
    }
}

/// Blank passphrases are refused before any PBKDF2 rounds run.
pub fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8; SALT_LEN],
    iterations: u32,
) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(GuardError::EmptyPassphrase);
    }
    if iterations == 0 {
        return Err(GuardError::Config("kdf iterations must be non-zero".into()));
    }
    let mut key = DerivedKey([0u8; DERIVED_KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase.expose().as_bytes(), salt, iterations, &mut key.0);
    Ok(key)
}

/// HMAC zero-pads keys shorter than the hash block, so keying with the
/// padded block is the same MAC as keying with the 32 derived bytes.
fn keyed_mac(key: &DerivedKey, digest: &ContentDigest) -> HmacSha256 {
    let mut block = Zeroizing::new([0u8; HMAC_BLOCK_LEN]);
    block[..DERIVED_KEY_LEN].copy_from_slice(&key.0);
    let mut mac = <HmacSha256 as KeyInit>::new(GenericArray::from_slice(&block[..]));
    mac.update(digest.as_bytes());
    mac
}

pub fn sign(key: &DerivedKey, digest: &ContentDigest) -> AuthenticationTag {
    AuthenticationTag(keyed_mac(key, digest).finalize().into_bytes().into())
}

/// Constant-time: `verify_slice` compares through `subtle`, so timing does
/// not depend on the position of the first differing byte.
pub fn verify_tag(
    key: &DerivedKey,
    digest: &ContentDigest,
    candidate: &AuthenticationTag,
) -> bool {
    keyed_mac(key, digest).verify_slice(candidate.as_bytes()).is_ok()
}
