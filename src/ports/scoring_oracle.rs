//! Scoring oracle port: Trait for the pre-trained classifier.
//!
//! This trait abstracts the model runtime (tree ensemble, stubs in tests)
//! from the evaluation pipeline.

use thiserror::Error;

use crate::domain::{FeatureVector, Impacts};

/// Errors raised by a scoring oracle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("feature vector does not match model inputs (expected {expected:?}, got {got:?})")]
    FeatureMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("inference failed: {0}")]
    Computation(String),
}

/// Trait for a binary classifier with local explanations.
///
/// Both operations must be deterministic for a fixed model and vector.
pub trait ScoringOracle: Send + Sync {
    /// Probability of the positive class, in `[0, 1]`.
    ///
    /// # Errors
    /// Returns `OracleError::Unavailable` if no model is loaded.
    /// Returns `OracleError::FeatureMismatch` if the vector is not aligned to the model.
    fn predict_probability(&self, vector: &FeatureVector) -> Result<f64, OracleError>;

    /// Signed per-feature impact for this single vector.
    ///
    /// # Errors
    /// Same failure modes as [`ScoringOracle::predict_probability`].
    fn explain(&self, vector: &FeatureVector) -> Result<Impacts, OracleError>;
}
