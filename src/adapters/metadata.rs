//! Model metadata loader.
//!
//! Reads `{ "features": [...], "threshold": 0.5 }` into a [`FeatureSchema`].
//! Any failure degrades to [`FeatureSchema::default`]: a missing file and a
//! malformed one are treated alike, but the reason is logged so they can be
//! told apart.
//!
//! The threshold decides the label, so next to a checked model the document
//! is taken from the verified artifact bytes ([`load_verified_schema`]).

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::adapters::artifact::{ArtifactError, VerifiedArtifacts, METADATA_FILE};
use crate::domain::{FeatureSchema, DEFAULT_THRESHOLD};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata is invalid: {0}")]
    Invalid(String),

    #[error("metadata failed its integrity check: {0}")]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    features: Vec<String>,
    #[serde(default)]
    threshold: Option<f64>,
}

/// Parse and validate a metadata document.
///
/// # Errors
/// Returns the reason the document could not be used.
pub fn parse_schema(bytes: &[u8]) -> Result<FeatureSchema, MetadataError> {
    let raw: RawMetadata = serde_json::from_slice(bytes)?;
    FeatureSchema::new(raw.features, raw.threshold.unwrap_or(DEFAULT_THRESHOLD))
        .map_err(MetadataError::Invalid)
}

/// Load and validate the metadata document at `path`.
///
/// # Errors
/// Returns the reason the document could not be used.
pub fn try_load_schema(path: &Path) -> Result<FeatureSchema, MetadataError> {
    parse_schema(&std::fs::read(path)?)
}

/// Load the metadata at `path` through the model's verified artifact set.
///
/// - `path` is the metadata file beside the model: served from `artifacts`,
///   which refuses it when a manifest exists and does not bind it.
/// - Any other location under `require_signed`: refused, nothing can vouch
///   for it.
/// - Otherwise: read from disk.
///
/// # Errors
/// Returns the reason the document could not be used.
pub fn try_load_verified_schema(
    path: &Path,
    artifacts: Option<&VerifiedArtifacts>,
    require_signed: bool,
) -> Result<FeatureSchema, MetadataError> {
    if let Some(artifacts) = artifacts {
        if path == artifacts.dir().join(METADATA_FILE) {
            return parse_schema(&artifacts.read(METADATA_FILE)?);
        }
    }
    if require_signed {
        return Err(ArtifactError::Unsigned(format!(
            "{path:?} is not covered by the signed model manifest"
        ))
        .into());
    }
    try_load_schema(path)
}

fn or_default(result: Result<FeatureSchema, MetadataError>, path: &Path) -> FeatureSchema {
    match result {
        Ok(schema) => {
            tracing::info!(
                "Loaded feature schema from {:?} ({} features, threshold={})",
                path,
                schema.len(),
                schema.threshold
            );
            schema
        }
        Err(e) => {
            tracing::warn!(
                "Using default feature schema; metadata at {:?} unusable: {}",
                path,
                e
            );
            FeatureSchema::default()
        }
    }
}

/// Load the schema, falling back to the built-in default on any failure.
#[must_use]
pub fn load_schema(path: &Path) -> FeatureSchema {
    or_default(try_load_schema(path), path)
}

/// [`try_load_verified_schema`], falling back to the built-in default on any
/// failure.
#[must_use]
pub fn load_verified_schema(
    path: &Path,
    artifacts: Option<&VerifiedArtifacts>,
    require_signed: bool,
) -> FeatureSchema {
    or_default(try_load_verified_schema(path, artifacts, require_signed), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::artifact::{
        sign_manifest, verify_artifacts, ArtifactManifest, VerificationPolicy, MODEL_FILE,
    };
    use ed25519_dalek::SigningKey;
    use tempfile::tempdir;

    fn write(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("model_meta.json");
        std::fs::write(&path, content).expect("write metadata");
        path
    }

    #[test]
    fn test_loads_features_and_threshold() {
        let temp = tempdir().expect("tempdir");
        let path = write(temp.path(), r#"{"features":["iop","age"],"threshold":0.42}"#);
        let schema = load_schema(&path);
        assert_eq!(schema.feature_order, vec!["iop".to_string(), "age".to_string()]);
        assert_eq!(schema.threshold, 0.42);
    }

    #[test]
    fn test_threshold_is_optional() {
        let temp = tempdir().expect("tempdir");
        let path = write(temp.path(), r#"{"features":["iop"]}"#);
        let schema = try_load_schema(&path).expect("valid");
        assert_eq!(schema.threshold, 0.5);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("absent.json");
        assert!(matches!(try_load_schema(&path), Err(MetadataError::Io(_))));
        assert_eq!(load_schema(&path), FeatureSchema::default());
    }

    #[test]
    fn test_malformed_documents_fall_back() {
        let temp = tempdir().expect("tempdir");
        for content in [
            "{not json",
            r#"{"threshold":0.3}"#,
            r#"{"features":"age"}"#,
            r#"{"features":[]}"#,
            r#"{"features":["age","age"]}"#,
            r#"{"features":["age"],"threshold":1.7}"#,
            r#"{"features":["age"],"threshold":"high"}"#,
        ] {
            let path = write(temp.path(), content);
            assert!(try_load_schema(&path).is_err(), "{content} should be rejected");
            let schema = load_schema(&path);
            assert_eq!(schema, FeatureSchema::default(), "{content}");
            assert_eq!(schema.threshold, 0.5);
            assert_eq!(schema.len(), 14);
        }
    }

    /// Model directory signed with only `model.json` bound.
    fn signed_model_only(dir: &Path) -> VerificationPolicy {
        std::fs::write(dir.join(MODEL_FILE), br#"{"trees":[]}"#).unwrap();
        let k = SigningKey::from_bytes(&[5u8; 32]);
        let manifest = ArtifactManifest::for_files(dir, &[MODEL_FILE]).unwrap();
        sign_manifest(dir, &manifest, &k).unwrap();
        VerificationPolicy {
            verifying_key: Some(k.verifying_key()),
            require_signed: true,
        }
    }

    #[test]
    fn test_unbound_metadata_beside_signed_model_is_refused() {
        let temp = tempdir().expect("tempdir");
        let policy = signed_model_only(temp.path());
        let path = write(temp.path(), r#"{"features":["iop","age"],"threshold":0.01}"#);
        let artifacts = verify_artifacts(temp.path(), &policy).expect("model verifies");

        let err = try_load_verified_schema(&path, Some(&artifacts), true).expect_err("unbound");
        assert!(matches!(err, MetadataError::Artifact(ArtifactError::Unsigned(_))), "{err}");
        let schema = load_verified_schema(&path, Some(&artifacts), true);
        assert_eq!(schema, FeatureSchema::default());
        assert_eq!(schema.threshold, 0.5);
    }

    #[test]
    fn test_metadata_outside_model_dir_is_refused_when_signing_required() {
        let temp = tempdir().expect("tempdir");
        let model_dir = temp.path().join("model");
        std::fs::create_dir(&model_dir).unwrap();
        let policy = signed_model_only(&model_dir);
        let artifacts = verify_artifacts(&model_dir, &policy).expect("model verifies");
        let elsewhere = write(temp.path(), r#"{"features":["iop"],"threshold":0.01}"#);

        assert!(matches!(
            try_load_verified_schema(&elsewhere, Some(&artifacts), true),
            Err(MetadataError::Artifact(ArtifactError::Unsigned(_)))
        ));
        // Refused even when the model itself failed to load.
        assert!(try_load_verified_schema(&elsewhere, None, true).is_err());
        // Without require_signed it is an ordinary file.
        let schema = try_load_verified_schema(&elsewhere, Some(&artifacts), false).expect("lenient");
        assert_eq!(schema.threshold, 0.01);
    }

    #[test]
    fn test_bound_metadata_comes_from_verified_bytes() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join(MODEL_FILE), br#"{"trees":[]}"#).unwrap();
        let path = write(temp.path(), r#"{"features":["iop","age"],"threshold":0.3}"#);
        let k = SigningKey::from_bytes(&[6u8; 32]);
        let manifest = ArtifactManifest::for_files(temp.path(), &[MODEL_FILE, METADATA_FILE]).unwrap();
        sign_manifest(temp.path(), &manifest, &k).unwrap();
        let policy = VerificationPolicy {
            verifying_key: Some(k.verifying_key()),
            require_signed: true,
        };
        let artifacts = verify_artifacts(temp.path(), &policy).expect("verify");

        // Rewritten after verification; the checked copy wins.
        write(temp.path(), r#"{"features":["iop","age"],"threshold":0.01}"#);
        let schema = try_load_verified_schema(&path, Some(&artifacts), true).expect("bound");
        assert_eq!(schema.threshold, 0.3);
    }
}
