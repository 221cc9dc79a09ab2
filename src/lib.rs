//! # OcuSight
//!
//! Glaucoma risk scoring with per-feature explanations.
//!
//! This crate provides:
//! - Feature engineering from a fixed set of patient measurements
//! - A gradient-boosted tree ensemble oracle with exact TreeSHAP attributions
//! - Signed model artifacts (SHA-256 manifest + Ed25519 signature)
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (PatientInput, FeatureVector, PredictionResult)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (tree ensemble, metadata, artifacts, log sanitizer)
//! - `application`: The evaluation use case wiring domain and ports
//! - `config`: Startup settings from the environment

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{PatientInput, PredictionResult, RiskLabel};

use domain::{InvalidTopK, SchemaMismatch};
use ports::OracleError;

/// Result type for OcuSight operations
pub type Result<T> = std::result::Result<T, OcuSightError>;

/// Main error type for OcuSight
#[derive(Debug, thiserror::Error)]
pub enum OcuSightError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatch),

    #[error(transparent)]
    InvalidTopK(#[from] InvalidTopK),

    #[error("Invalid patient data: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Artifact integrity error: {0}")]
    Artifact(#[from] adapters::artifact::ArtifactError),
}

impl From<OracleError> for OcuSightError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(reason) => Self::ModelUnavailable(reason),
            OracleError::FeatureMismatch { expected, got } => {
                // Every model input not found at its expected position.
                let missing = expected
                    .iter()
                    .enumerate()
                    .filter(|(i, name)| got.get(*i) != Some(*name))
                    .map(|(_, name)| name.clone())
                    .collect();
                Self::SchemaMismatch(SchemaMismatch { missing })
            }
            OracleError::Computation(reason) => Self::Inference(reason),
        }
    }
}
