//! GBDT adapter: Implementation of ScoringOracle over a boosted tree ensemble.
//!
//! The model artifact is a JSON dump of a binary-logistic tree ensemble
//! (see [`TreeEnsemble`]). Probabilities are `sigmoid(margin)`; explanations
//! are exact TreeSHAP values in log-odds space.
//!
//! # Artifact integrity
//!
//! Loading goes through [`crate::adapters::artifact::verify_artifacts`] first
//! and parses the bytes it verified, so a manifest-bound model whose bytes
//! changed is never deserialized. The verified set is returned to the caller
//! for the metadata document.
//!
//! # Availability
//!
//! A `GbdtOracle` that failed to load stays usable as a value but every
//! scoring call fails with `OracleError::Unavailable`.

mod shap;
mod tree;

use std::path::Path;

pub use shap::shap_values;
pub use tree::{sigmoid, Node, Tree, TreeEnsemble, FORMAT_VERSION, OBJECTIVE_BINARY_LOGISTIC};

use crate::adapters::artifact::{verify_artifacts, ArtifactError, VerificationPolicy, VerifiedArtifacts, MODEL_FILE};
use crate::domain::{FeatureVector, Impacts};
use crate::ports::{OracleError, ScoringOracle};

/// Tree-ensemble scoring oracle.
#[derive(Debug, Default)]
pub struct GbdtOracle {
    model: Option<TreeEnsemble>,
    /// Why the last load attempt failed, reported on every later call.
    load_error: Option<String>,
}

impl GbdtOracle {
    /// Create an adapter with no model loaded.
    #[must_use]
    pub fn new() -> Self {
        tracing::info!("Initializing GbdtOracle");
        Self::default()
    }

    /// Wrap an in-memory ensemble after validating it.
    ///
    /// # Errors
    /// Returns `OracleError::Unavailable` if the ensemble is malformed.
    pub fn from_ensemble(model: TreeEnsemble) -> Result<Self, OracleError> {
        model.validate().map_err(OracleError::Unavailable)?;
        Ok(Self {
            model: Some(model),
            load_error: None,
        })
    }

    /// Load the model artifact from a directory (or a direct path to `model.json`).
    ///
    /// Returns the verified artifact set so sibling files can be read from the
    /// same checked bytes.
    ///
    /// # Errors
    /// Returns `OracleError::Unavailable` if the artifact fails its integrity
    /// check, cannot be read or parsed, or is structurally invalid. The
    /// previously loaded model, if any, is discarded in that case.
    pub fn load_model(&mut self, model_path: &Path, policy: &VerificationPolicy) -> Result<VerifiedArtifacts, OracleError> {
        self.model = None;
        let result = Self::read_model(model_path, policy);
        self.load_error = result.as_ref().err().map(ToString::to_string);
        let (model, artifacts) = result?;

        tracing::info!(
            "Loaded model (trees={}, n_features={}, base_score={})",
            model.trees.len(),
            model.feature_names.len(),
            model.base_score
        );

        self.model = Some(model);
        Ok(artifacts)
    }

    fn read_model(model_path: &Path, policy: &VerificationPolicy) -> Result<(TreeEnsemble, VerifiedArtifacts), OracleError> {
        let (base_dir, file_name) = if model_path.is_file() {
            let name = model_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| OracleError::Unavailable(format!("invalid model path {model_path:?}")))?;
            (model_path.parent().unwrap_or(model_path), name)
        } else {
            (model_path, MODEL_FILE)
        };

        let unavailable = |e: ArtifactError| OracleError::Unavailable(e.to_string());
        let artifacts = verify_artifacts(base_dir, policy).map_err(unavailable)?;
        let bytes = artifacts.read(file_name).map_err(unavailable)?;

        let model: TreeEnsemble = serde_json::from_slice(&bytes).map_err(|e| {
            OracleError::Unavailable(format!("invalid model JSON in {file_name}: {e}"))
        })?;
        model.validate().map_err(OracleError::Unavailable)?;

        tracing::debug!("Parsed model artifact {:?}", base_dir.join(file_name));
        Ok((model, artifacts))
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Feature names in the order the model consumes them.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        self.model.as_ref().map(|m| m.feature_names.as_slice())
    }

    /// Log-odds baseline that the attributions are measured against.
    ///
    /// # Errors
    /// Returns `OracleError::Unavailable` if no model is loaded.
    pub fn expected_value(&self) -> Result<f64, OracleError> {
        Ok(self.loaded()?.expected_value())
    }

    fn loaded(&self) -> Result<&TreeEnsemble, OracleError> {
        self.model.as_ref().ok_or_else(|| {
            OracleError::Unavailable(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "model not loaded".into()),
            )
        })
    }

    /// Resolve the model and check the vector is positionally aligned with it.
    fn aligned<'a>(&'a self, vector: &'a FeatureVector) -> Result<(&'a TreeEnsemble, &'a [f64]), OracleError> {
        let model = self.loaded()?;
        if vector.names() != model.feature_names.as_slice() {
            return Err(OracleError::FeatureMismatch {
                expected: model.feature_names.clone(),
                got: vector.names().to_vec(),
            });
        }
        Ok((model, vector.values()))
    }
}

impl ScoringOracle for GbdtOracle {
    fn predict_probability(&self, vector: &FeatureVector) -> Result<f64, OracleError> {
        let (model, x) = self.aligned(vector)?;
        let margin = model.margin(x);
        let probability = sigmoid(margin);

        tracing::debug!("margin={:.4}, probability={:.4}", margin, probability);

        if !probability.is_finite() {
            return Err(OracleError::Computation(
                "model produced a non-finite probability".into(),
            ));
        }
        Ok(probability)
    }

    fn explain(&self, vector: &FeatureVector) -> Result<Impacts, OracleError> {
        let (model, x) = self.aligned(vector)?;
        let phi = shap_values(model, x);

        if phi.iter().any(|v| !v.is_finite()) {
            return Err(OracleError::Computation(
                "attribution produced a non-finite value".into(),
            ));
        }

        Ok(model
            .feature_names
            .iter()
            .cloned()
            .zip(phi)
            .collect())
    }
}
