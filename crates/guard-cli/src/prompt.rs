use guard_core::passphrase::{Passphrase, PassphraseSource, Purpose};
use guard_core::{GuardError, Result};
use zeroize::Zeroizing;

pub const PASSPHRASE_ENV: &str = "GUARD_PASSPHRASE";
pub const PASSPHRASE_CONFIRM_ENV: &str = "GUARD_PASSPHRASE_CONFIRM";

/// Terminal prompt without echo. `GUARD_PASSPHRASE` short-circuits the
/// prompt for scripted use.
pub struct PromptPassphrase;

impl PassphraseSource for PromptPassphrase {
    fn obtain(&mut self, purpose: Purpose) -> Result<Passphrase> {
        let raw = match purpose {
            Purpose::Install => prompt_twice("Enter a passphrase to protect the installation: ")?,
            Purpose::Verify => prompt_once("Enter the passphrase to verify the installation: ")?,
        };
        Ok(Passphrase::new(raw.as_str()))
    }
}

fn env_passphrase() -> Option<Zeroizing<String>> {
    match std::env::var(PASSPHRASE_ENV) {
        Ok(pw) if !pw.is_empty() => Some(Zeroizing::new(pw)),
        _ => None,
    }
}

fn read_hidden(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .map_err(|e| GuardError::Passphrase(format!("prompt: {e}")))
}

fn prompt_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = env_passphrase() {
        return Ok(pw);
    }
    read_hidden(prompt)
}

fn prompt_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = env_passphrase() {
        if let Ok(confirm) = std::env::var(PASSPHRASE_CONFIRM_ENV) {
            let confirm = Zeroizing::new(confirm);
            if confirm.as_str() != pw.as_str() {
                return Err(GuardError::Passphrase("confirmation mismatch".into()));
            }
        }
        return Ok(pw);
    }
    let first = read_hidden(prompt)?;
    if first.trim().is_empty() {
        // Let the guard report EmptyPassphrase rather than asking again.
        return Ok(first);
    }
    let second = read_hidden("Confirm passphrase: ")?;
    if first.trim() != second.trim() {
        return Err(GuardError::Passphrase("passphrases do not match".into()));
    }
    Ok(first)
}
