//! Model artifact integrity: SHA-256 manifest with an Ed25519 signature.
//!
//! A model directory may carry `manifest.json`, binding each artifact file to
//! its SHA-256 digest, and `manifest.sig`, a raw 64-byte Ed25519 signature over
//! the exact manifest bytes. [`verify_artifacts`] enforces whatever envelope is
//! present and, with `require_signed`, refuses directories without one. It
//! hands back the bytes it hashed; once a manifest is present, files it does
//! not bind are not served at all.
//!
//! The `ocusight-sign` binary produces both files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Tree-ensemble artifact file name.
pub const MODEL_FILE: &str = "model.json";

/// Feature-order metadata file name.
pub const METADATA_FILE: &str = "model_meta.json";

/// Digest manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Detached signature file name.
pub const SIGNATURE_FILE: &str = "manifest.sig";

const MANIFEST_VERSION: u32 = 1;

/// Errors from artifact integrity checks.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("digest mismatch for {0}")]
    DigestMismatch(String),

    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error("unsigned artifacts refused: {0}")]
    Unsigned(String),

    #[error("invalid key material: {0}")]
    Key(String),
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// Constant-time compare for ASCII strings (hex digests).
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// Returns `ArtifactError::Key` for bad base64, wrong length or an invalid point.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ArtifactError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ArtifactError::Key(format!("public key is not base64: {e}")))?;
    let raw: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ArtifactError::Key(format!("public key must be 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&raw).map_err(|e| ArtifactError::Key(e.to_string()))
}

/// Signed list of artifact files and their digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    /// Unix timestamp (seconds) of signing.
    pub created_at: i64,
    /// File name (relative to the model directory) → SHA-256 hex.
    pub files: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Hash the named files in `dir`.
    ///
    /// # Errors
    /// Returns an error if any file cannot be read.
    pub fn for_files(dir: &Path, names: &[&str]) -> Result<Self, ArtifactError> {
        let mut files = BTreeMap::new();
        for name in names {
            let bytes = read(&dir.join(name))?;
            files.insert((*name).to_string(), sha256_hex(&bytes));
        }
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            version: MANIFEST_VERSION,
            created_at,
            files,
        })
    }

    fn check(&self) -> Result<(), ArtifactError> {
        if self.version != MANIFEST_VERSION {
            return Err(ArtifactError::Manifest(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if !self.files.contains_key(MODEL_FILE) {
            return Err(ArtifactError::Manifest(format!("{MODEL_FILE} is not bound")));
        }
        for name in self.files.keys() {
            let p = Path::new(name);
            if p.is_absolute() || p.components().count() != 1 {
                return Err(ArtifactError::Manifest(format!(
                    "file entry {name:?} must be a plain file name"
                )));
            }
        }
        Ok(())
    }
}

/// Write `manifest.json` and its detached signature into `dir`.
///
/// # Errors
/// Returns an error if either file cannot be written.
pub fn sign_manifest(dir: &Path, manifest: &ArtifactManifest, signing_key: &SigningKey) -> Result<(), ArtifactError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| ArtifactError::Manifest(e.to_string()))?;
    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &bytes).map_err(|source| ArtifactError::Io {
        path: manifest_path,
        source,
    })?;

    let signature: Signature = signing_key.sign(&bytes);
    let sig_path = dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, signature.to_bytes()).map_err(|source| ArtifactError::Io {
        path: sig_path,
        source,
    })?;
    Ok(())
}

/// How strictly artifacts are checked at load time.
#[derive(Debug, Clone, Default)]
pub struct VerificationPolicy {
    /// Key that must have signed the manifest, if configured.
    pub verifying_key: Option<VerifyingKey>,
    /// Refuse directories without a manifest, signature and key.
    pub require_signed: bool,
}

/// Artifact bytes exactly as they were hashed during verification.
///
/// Loaders parse from here rather than re-reading the files, so what gets
/// deserialized is what was checked.
#[derive(Debug)]
pub struct VerifiedArtifacts {
    dir: PathBuf,
    manifest: Option<ArtifactManifest>,
    contents: BTreeMap<String, Vec<u8>>,
}

impl VerifiedArtifacts {
    /// Directory the artifacts were verified in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The checked manifest; `None` when the directory was unsigned and the
    /// policy allowed it.
    #[must_use]
    pub fn manifest(&self) -> Option<&ArtifactManifest> {
        self.manifest.as_ref()
    }

    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    /// Bytes of the artifact `name` in [`Self::dir`].
    ///
    /// With a manifest, only bound files are served, from the verified copy.
    /// Without one the file is read from disk, which the policy has already
    /// allowed.
    ///
    /// # Errors
    /// `Unsigned` for a file the manifest does not bind, `Io` if an unsigned
    /// file cannot be read.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        if let Some(bytes) = self.contents.get(name) {
            return Ok(bytes.clone());
        }
        if self.manifest.is_some() {
            return Err(ArtifactError::Unsigned(format!(
                "{name} is not bound by {MANIFEST_FILE}"
            )));
        }
        read(&self.dir.join(name))
    }
}

/// Verify the integrity envelope of a model directory.
///
/// On success every file bound by the manifest has been read once and its
/// digest checked; those bytes are kept in the returned [`VerifiedArtifacts`].
///
/// # Errors
/// Fails on a missing envelope under `require_signed`, a bad signature, a
/// malformed manifest, or any bound file whose digest differs.
pub fn verify_artifacts(dir: &Path, policy: &VerificationPolicy) -> Result<VerifiedArtifacts, ArtifactError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let sig_path = dir.join(SIGNATURE_FILE);

    if !manifest_path.exists() {
        if policy.require_signed {
            return Err(ArtifactError::Unsigned(format!(
                "{MANIFEST_FILE} not found in {dir:?}"
            )));
        }
        tracing::warn!("Loading unverified model artifacts from {:?}", dir);
        return Ok(VerifiedArtifacts {
            dir: dir.to_path_buf(),
            manifest: None,
            contents: BTreeMap::new(),
        });
    }

    let manifest_bytes = read(&manifest_path)?;

    match (&policy.verifying_key, sig_path.exists()) {
        (Some(key), true) => {
            let sig_bytes = read(&sig_path)?;
            let raw: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
                ArtifactError::Signature(format!(
                    "expected 64 signature bytes, got {}",
                    sig_bytes.len()
                ))
            })?;
            key.verify(&manifest_bytes, &Signature::from_bytes(&raw))
                .map_err(|_| ArtifactError::Signature("manifest signature is invalid".into()))?;
            tracing::info!("Model manifest signature verified");
        }
        (Some(_), false) => {
            return Err(ArtifactError::Signature(format!(
                "{SIGNATURE_FILE} missing but a verifying key is configured"
            )));
        }
        (None, has_sig) => {
            if policy.require_signed {
                return Err(ArtifactError::Unsigned(
                    "no verifying key configured".into(),
                ));
            }
            if has_sig {
                tracing::warn!("Manifest is signed but no verifying key is configured; checking digests only");
            } else {
                tracing::warn!("Manifest is unsigned; checking digests only");
            }
        }
    }

    let manifest: ArtifactManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| ArtifactError::Manifest(e.to_string()))?;
    manifest.check()?;

    let mut contents = BTreeMap::new();
    for (name, expected) in &manifest.files {
        let bytes = read(&dir.join(name))?;
        if !constant_time_eq_str(&sha256_hex(&bytes), expected) {
            return Err(ArtifactError::DigestMismatch(name.clone()));
        }
        contents.insert(name.clone(), bytes);
    }

    tracing::info!("Verified {} artifact digests", manifest.files.len());
    Ok(VerifiedArtifacts {
        dir: dir.to_path_buf(),
        manifest: Some(manifest),
        contents,
    })
}
