//! Passphrase handling and pluggable sources.
//!
//! The guard never prompts on its own. Callers hand it a `PassphraseSource`
//! and the guard asks for a passphrase only at the point a key is actually
//! needed, so a content mismatch on verify never reaches the source.

use crate::error::{GuardError, Result};
use keyring::Entry;
use std::fmt;
use zeroize::Zeroizing;

pub const KEYRING_SERVICE: &str = "IntegrityGuard";

/// User-supplied secret text. Trimmed on construction, wiped on drop.
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = Zeroizing::new(raw.into());
        Self(Zeroizing::new(raw.trim().to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Why a passphrase is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Install,
    Verify,
}

pub trait PassphraseSource {
    fn obtain(&mut self, purpose: Purpose) -> Result<Passphrase>;
}

/// Fixed value handed in by an embedding caller.
pub struct StaticPassphrase(Zeroizing<String>);

impl StaticPassphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }
}

impl PassphraseSource for StaticPassphrase {
    fn obtain(&mut self, _purpose: Purpose) -> Result<Passphrase> {
        Ok(Passphrase::new(self.0.as_str()))
    }
}

/// Reads a passphrase the operator stored in the OS secret store.
/// The guard only reads this entry; it never writes one.
pub struct KeyringPassphrase {
    account: String,
}

impl KeyringPassphrase {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

impl PassphraseSource for KeyringPassphrase {
    fn obtain(&mut self, _purpose: Purpose) -> Result<Passphrase> {
        let entry = Entry::new(KEYRING_SERVICE, &self.account)
            .map_err(|e| GuardError::Passphrase(format!("keyring init: {e}")))?;
        let secret = entry
            .get_password()
            .map_err(|e| GuardError::Passphrase(format!("keyring lookup: {e}")))?;
        Ok(Passphrase::new(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_detects_blank() {
        assert_eq!(Passphrase::new("  correct horse \n").expose(), "correct horse");
        assert!(Passphrase::new(" \t\n").is_empty());
        assert!(Passphrase::new("").is_empty());
    }

    #[test]
    fn debug_is_redacted() {
        let p = Passphrase::new("hunter2");
        assert!(!format!("{p:?}").contains("hunter2"));
    }

    #[test]
    fn static_source_returns_value_each_time() {
        let mut src = StaticPassphrase::new("pw");
        assert_eq!(src.obtain(Purpose::Install).unwrap().expose(), "pw");
        assert_eq!(src.obtain(Purpose::Verify).unwrap().expose(), "pw");
    }
}
