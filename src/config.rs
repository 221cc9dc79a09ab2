//! Startup settings.
//!
//! Everything is read from `OCUSIGHT_*` environment variables once, before
//! the evaluation service is built. The CLI may override individual fields.

use std::path::{Path, PathBuf};

use crate::adapters::artifact::{verifying_key_from_b64, ArtifactError, VerificationPolicy, METADATA_FILE};

pub const MODEL_DIR_ENV: &str = "OCUSIGHT_MODEL_DIR";
pub const METADATA_PATH_ENV: &str = "OCUSIGHT_METADATA_PATH";
pub const TOP_K_ENV: &str = "OCUSIGHT_TOP_K";
pub const REQUIRE_SIGNED_ENV: &str = "OCUSIGHT_REQUIRE_SIGNED_MODEL";
pub const PUBKEY_B64_ENV: &str = "OCUSIGHT_MODEL_PUBKEY_B64";
pub const PUBKEY_FILE_ENV: &str = "OCUSIGHT_MODEL_PUBKEY_B64_FILE";
pub const LOG_MODE_ENV: &str = "OCUSIGHT_LOG_MODE";
pub const LOG_FILE_ENV: &str = "OCUSIGHT_LOG_FILE";

pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_TOP_K: usize = 6;
pub const DEFAULT_LOG_FILE: &str = "ocusight.log";

/// Where the Ed25519 public key for model verification comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeySource {
    Inline(String),
    File(PathBuf),
}

/// Log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Write to stderr so stdout carries only the report.
    #[default]
    Stderr,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model_dir: PathBuf,
    /// Explicit metadata location; `None` means `<model_dir>/model_meta.json`.
    pub metadata_path: Option<PathBuf>,
    pub top_k: usize,
    pub require_signed_model: bool,
    pub public_key: Option<PublicKeySource>,
    pub log_mode: LogMode,
    pub log_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            metadata_path: None,
            top_k: DEFAULT_TOP_K,
            require_signed_model: false,
            public_key: None,
            log_mode: LogMode::default(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let top_k = match non_empty(lookup(TOP_K_ENV)) {
            None => defaults.top_k,
            Some(raw) => match raw.trim().parse::<i64>().ok().map(crate::domain::top_k) {
                Some(Ok(k)) => k,
                _ => {
                    tracing::warn!(
                        "Ignoring {TOP_K_ENV}={raw:?}: expected a positive integer, using {}",
                        defaults.top_k
                    );
                    defaults.top_k
                }
            },
        };

        let public_key = non_empty(lookup(PUBKEY_B64_ENV))
            .map(PublicKeySource::Inline)
            .or_else(|| non_empty(lookup(PUBKEY_FILE_ENV)).map(|p| PublicKeySource::File(p.into())));

        let log_mode = match non_empty(lookup(LOG_MODE_ENV)).as_deref() {
            Some("file") => LogMode::File,
            _ => LogMode::Stderr,
        };

        Self {
            model_dir: non_empty(lookup(MODEL_DIR_ENV)).map_or(defaults.model_dir, PathBuf::from),
            metadata_path: non_empty(lookup(METADATA_PATH_ENV)).map(PathBuf::from),
            top_k,
            require_signed_model: lookup(REQUIRE_SIGNED_ENV).is_some_and(|v| parse_bool(&v)),
            public_key,
            log_mode,
            log_file: non_empty(lookup(LOG_FILE_ENV)).map_or(defaults.log_file, PathBuf::from),
        }
    }

    /// Metadata document location, defaulting to the file next to the model.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_path
            .clone()
            .unwrap_or_else(|| self.model_dir.join(METADATA_FILE))
    }

    /// Build the artifact verification policy.
    ///
    /// # Errors
    /// Returns an error if the configured public key cannot be read or decoded.
    pub fn verification_policy(&self) -> Result<VerificationPolicy, ArtifactError> {
        let verifying_key = match &self.public_key {
            None => None,
            Some(PublicKeySource::Inline(b64)) => Some(verifying_key_from_b64(b64)?),
            Some(PublicKeySource::File(path)) => Some(verifying_key_from_b64(&read_key_file(path)?)?),
        };

        Ok(VerificationPolicy {
            verifying_key,
            require_signed: self.require_signed_model,
        })
    }
}

fn read_key_file(path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s, Settings::default());
        assert_eq!(s.top_k, 6);
        assert_eq!(s.metadata_path(), PathBuf::from("models/model_meta.json"));
        assert_eq!(s.log_mode, LogMode::Stderr);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            (MODEL_DIR_ENV, "/opt/ocusight/model"),
            (METADATA_PATH_ENV, "/etc/ocusight/meta.json"),
            (TOP_K_ENV, "3"),
            (REQUIRE_SIGNED_ENV, "yes"),
            (LOG_MODE_ENV, "file"),
            (LOG_FILE_ENV, "/var/log/ocusight.log"),
        ]);
        assert_eq!(s.model_dir, PathBuf::from("/opt/ocusight/model"));
        assert_eq!(s.metadata_path(), PathBuf::from("/etc/ocusight/meta.json"));
        assert_eq!(s.top_k, 3);
        assert!(s.require_signed_model);
        assert_eq!(s.log_mode, LogMode::File);
        assert_eq!(s.log_file, PathBuf::from("/var/log/ocusight.log"));
    }

    #[test]
    fn test_invalid_top_k_falls_back() {
        for raw in ["0", "-2", "six", "   "] {
            assert_eq!(settings(&[(TOP_K_ENV, raw)]).top_k, DEFAULT_TOP_K, "{raw}");
        }
    }

    #[test]
    fn test_bool_parsing() {
        for v in ["1", "true", "TRUE", "yes", "YES"] {
            assert!(settings(&[(REQUIRE_SIGNED_ENV, v)]).require_signed_model);
        }
        for v in ["0", "false", "no", "on", ""] {
            assert!(!settings(&[(REQUIRE_SIGNED_ENV, v)]).require_signed_model);
        }
    }

    #[test]
    fn test_verification_policy_from_inline_and_file_key() {
        let key = SigningKey::from_bytes(&[3u8; 32]).verifying_key();
        let b64 = base64::engine::general_purpose::STANDARD.encode(key.to_bytes());

        let policy = settings(&[(PUBKEY_B64_ENV, b64.as_str())])
            .verification_policy()
            .expect("inline key");
        assert_eq!(policy.verifying_key, Some(key));
        assert!(!policy.require_signed);

        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("model.pub");
        std::fs::write(&path, format!("{b64}\n")).unwrap();
        let s = settings(&[(PUBKEY_FILE_ENV, path.to_str().unwrap())]);
        assert_eq!(s.verification_policy().unwrap().verifying_key, Some(key));
    }

    #[test]
    fn test_inline_key_takes_precedence_and_bad_keys_fail() {
        let s = settings(&[(PUBKEY_B64_ENV, "not base64!"), (PUBKEY_FILE_ENV, "/nonexistent")]);
        assert_eq!(s.public_key, Some(PublicKeySource::Inline("not base64!".into())));
        assert!(matches!(s.verification_policy(), Err(ArtifactError::Key(_))));

        let s = settings(&[(PUBKEY_FILE_ENV, "/nonexistent/ocusight.pub")]);
        assert!(matches!(s.verification_policy(), Err(ArtifactError::Io { .. })));
    }
}
