//! Domain layer: Core business types and logic.
//!
//! Pure functions over patient measurements: feature engineering, the
//! decision rule and attribution ranking. No I/O happens here.

pub mod attribution;
pub mod features;
mod patient;
pub mod prediction;

pub use attribution::{rank, top_k, Attribution, Impacts, InvalidTopK};
pub use features::{
    build, DerivedFeatures, FeatureSchema, FeatureVector, SchemaMismatch, DEFAULT_FEATURE_ORDER,
    DEFAULT_THRESHOLD,
};
pub use patient::{Gender, PatientInput};
pub use prediction::{decide, PredictionResult, RiskLabel};
