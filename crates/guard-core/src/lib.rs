//! Passphrase-bound integrity guard for a single protected file.
//!
//! `install` records a SHA-256 digest of the file together with an
//! HMAC-SHA256 tag keyed by a PBKDF2 derivation of the operator's passphrase
//! (salted with the first 16 digest bytes). `verify` succeeds only when the
//! content is unchanged and the same passphrase is supplied.

pub mod access;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod guard;
pub mod passphrase;
pub mod store;

pub use error::{GuardError, Result};
pub use guard::{Guard, Verdict};
