use crate::crypto::DEFAULT_KDF_ITERATIONS;
use crate::error::{GuardError, Result};
use crate::store::{DIGEST_FILE, TAG_FILE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "integrity-guard";
pub const CONFIG_FILE: &str = "config.json";

/// Everything a guard instance needs to know about where it operates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub protected_file: PathBuf,
    pub install_dir: PathBuf,
    pub kdf_iterations: u32,
    /// Program used by `run` to launch the protected file, e.g. `python3`.
    /// When unset the file is executed directly.
    pub interpreter: Option<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            protected_file: PathBuf::from("protected.py"),
            install_dir: PathBuf::from("guard_install"),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            interpreter: None,
        }
    }
}

impl GuardConfig {
    pub fn new(protected_file: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            protected_file: protected_file.into(),
            install_dir: install_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| GuardError::io(path, e))?;
        let config: GuardConfig = serde_json::from_slice(&data)
            .map_err(|e| GuardError::Config(format!("parse {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Explicit path if given, otherwise the per-user config file when one
    /// exists, otherwise built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(GuardError::Config("kdf_iterations must be non-zero".into()));
        }
        if self.protected_file.as_os_str().is_empty() {
            return Err(GuardError::Config("protected_file is empty".into()));
        }
        if self.install_dir.as_os_str().is_empty() {
            return Err(GuardError::Config("install_dir is empty".into()));
        }
        if self.install_dir == self.protected_file {
            return Err(GuardError::Config(
                "install_dir must differ from protected_file".into(),
            ));
        }
        let Some(name) = self.protected_file.file_name() else {
            return Err(GuardError::Config(format!(
                "protected_file has no file name: {}",
                self.protected_file.display()
            )));
        };
        if name == DIGEST_FILE || name == TAG_FILE {
            return Err(GuardError::Config(format!(
                "protected_file may not be named {}; the install record uses that name",
                name.to_string_lossy()
            )));
        }
        let parent = match self.protected_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if same_dir(parent, &self.install_dir) {
            return Err(GuardError::Config(
                "protected_file must not live directly inside install_dir".into(),
            ));
        }
        Ok(())
    }
}

/// Lexical match, or both paths exist and resolve to the same directory.
fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn default_config_path() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = GuardConfig::default();
        assert_eq!(config.kdf_iterations, 200_000);
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"protected_file": "/srv/app.py", "interpreter": "python3"}"#).unwrap();
        let config = GuardConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.protected_file, PathBuf::from("/srv/app.py"));
        assert_eq!(config.install_dir, PathBuf::from("guard_install"));
        assert_eq!(config.interpreter.as_deref(), Some("python3"));
        assert_eq!(config.kdf_iterations, DEFAULT_KDF_ITERATIONS);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(GuardConfig::load(&path), Err(GuardError::Config(_))));
    }

    #[test]
    fn missing_explicit_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = GuardConfig::resolve(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, GuardError::NotFound(_)));
    }

    #[test]
    fn rejects_zero_iterations_and_overlapping_paths() {
        let config = GuardConfig::default().with_kdf_iterations(0);
        assert!(config.validate().is_err());
        let config = GuardConfig::new("same", "same");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_record_artifact_names() {
        for name in [DIGEST_FILE, TAG_FILE] {
            let config = GuardConfig::new(Path::new("/srv").join(name), "/var/guard");
            assert!(matches!(config.validate(), Err(GuardError::Config(_))));
        }
        GuardConfig::new("/srv/signature.txt", "/var/guard").validate().unwrap();
    }

    #[test]
    fn rejects_file_directly_inside_install_dir() {
        let config = GuardConfig::new("/var/guard/app.py", "/var/guard");
        assert!(config.validate().is_err());
        let config = GuardConfig::new("protected.py", ".");
        assert!(config.validate().is_err());

        let dir = tempdir().unwrap();
        let install = dir.path().join("install");
        fs::create_dir(&install).unwrap();
        let via_dotdot = dir.path().join("other").join("..").join("install").join("app.py");
        fs::create_dir(dir.path().join("other")).unwrap();
        assert!(GuardConfig::new(via_dotdot, &install).validate().is_err());
    }
}
