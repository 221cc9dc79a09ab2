//! Evaluation service: Scores one patient and explains the score.
//!
//! This service coordinates:
//! - Input bounds validation
//! - Feature vector assembly against the loaded schema
//! - Probability prediction and thresholding
//! - Attribution and top-K ranking

use std::sync::Arc;

use crate::adapters::gbdt::GbdtOracle;
use crate::adapters::metadata::load_verified_schema;
use crate::config::Settings;
use crate::domain::{build, decide, rank, FeatureSchema, FeatureVector, InvalidTopK, PatientInput, PredictionResult};
use crate::ports::ScoringOracle;
use crate::OcuSightError;

/// Immutable startup context plus the evaluation pipeline.
///
/// Built once; `evaluate` takes `&self` and keeps no state between calls, so
/// a service can be shared across threads behind an `Arc`.
pub struct EvaluationService<O>
where
    O: ScoringOracle,
{
    oracle: Arc<O>,
    schema: Arc<FeatureSchema>,
    top_k: usize,
}

impl<O> EvaluationService<O>
where
    O: ScoringOracle,
{
    /// Create a new evaluation service.
    ///
    /// # Errors
    /// Returns `InvalidTopK` if `top_k` is zero.
    pub fn new(oracle: Arc<O>, schema: Arc<FeatureSchema>, top_k: usize) -> crate::Result<Self> {
        if top_k == 0 {
            return Err(InvalidTopK(0).into());
        }
        Ok(Self {
            oracle,
            schema,
            top_k,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score one patient.
    ///
    /// # Errors
    /// - `Validation` if any measurement is out of bounds (all reported at once)
    /// - `SchemaMismatch` if the schema or the model cannot be aligned with the vector
    /// - `ModelUnavailable` if the oracle has no model
    /// - `Inference` if the oracle returns an unusable value
    ///
    /// No partial result is ever returned.
    pub fn evaluate(&self, input: &PatientInput) -> crate::Result<PredictionResult> {
        tracing::info!("Starting evaluation...");

        input.validate().map_err(|errors| {
            tracing::warn!("Rejected patient input: {} violation(s)", errors.len());
            OcuSightError::Validation(errors)
        })?;

        let vector = build(input, &self.schema)?;
        tracing::debug!("Feature vector: {}", describe(&vector));

        let probability = self.oracle.predict_probability(&vector)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(OcuSightError::Inference(format!(
                "probability {probability} outside [0, 1]"
            )));
        }
        let label = decide(probability, self.schema.threshold);
        tracing::debug!("Decided {} at threshold {}", label, self.schema.threshold);

        let impacts = self.oracle.explain(&vector)?;
        let attributions = rank(&vector, &impacts, self.top_k)?;

        tracing::info!(
            "Evaluation complete: label={}, probability={:.4}, attributions={}",
            label,
            probability,
            attributions.len()
        );

        Ok(PredictionResult {
            probability,
            label,
            threshold: self.schema.threshold,
            attributions,
        })
    }
}

impl EvaluationService<GbdtOracle> {
    /// Build the production service from settings.
    ///
    /// The metadata document falls back to the default schema; under
    /// `require_signed_model` only a copy bound by the model's manifest is
    /// used. A model that fails to load does not abort startup; the service
    /// is still returned and every evaluation then fails with
    /// `ModelUnavailable`.
    ///
    /// # Errors
    /// Returns an error if the configured verification key is unusable or
    /// `top_k` is zero.
    pub fn bootstrap(settings: &Settings) -> crate::Result<Self> {
        tracing::info!("Bootstrapping evaluation service from {:?}", settings.model_dir);

        let policy = settings.verification_policy()?;

        // Model first: its manifest also binds the metadata file.
        let mut oracle = GbdtOracle::new();
        let loaded = oracle.load_model(&settings.model_dir, &policy);
        let schema = load_verified_schema(
            &settings.metadata_path(),
            loaded.as_ref().ok(),
            policy.require_signed,
        );

        match loaded {
            Ok(_) if oracle.feature_names() != Some(schema.feature_order.as_slice()) => {
                tracing::warn!(
                    "Model inputs differ from the feature schema; evaluations will fail with a schema mismatch"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Model unavailable: {}", e),
        }

        Self::new(Arc::new(oracle), Arc::new(schema), settings.top_k)
    }
}

fn describe(vector: &FeatureVector) -> String {
    vector
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
