//! Feature engineering and schema alignment.
//!
//! The classifier consumes a positional vector, so the order of names in the
//! [`FeatureSchema`] is part of the model contract. [`build`] computes the four
//! engineered ratios and then emits values strictly in schema order, failing
//! loudly instead of silently misaligning columns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::patient::PatientInput;

/// Denominator guard used by the ratio features.
pub const EPSILON: f64 = 1e-3;

/// Decision threshold used when no metadata is available.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Feature order the bundled model was trained with.
pub const DEFAULT_FEATURE_ORDER: [&str; 14] = [
    "age",
    "gender",
    "iop",
    "cct",
    "heart_rate",
    "bp_sys",
    "screen_time_h",
    "sleep_h",
    "blink_per_min",
    "pupil_mm",
    "iop_cct_ratio",
    "screen_sleep_ratio",
    "age_iop",
    "bp_screen",
];

/// Feature names that could not be lined up with the schema or the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feature schema mismatch, unresolved: {}", missing.join(", "))]
pub struct SchemaMismatch {
    pub missing: Vec<String>,
}

/// Ordered feature names expected by the scoring model plus its decision threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub feature_order: Vec<String>,
    pub threshold: f64,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            feature_order: DEFAULT_FEATURE_ORDER.iter().map(|s| (*s).to_string()).collect(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl FeatureSchema {
    /// Create a schema after checking it is usable.
    ///
    /// # Errors
    /// Returns a description of the first structural problem found.
    pub fn new(feature_order: Vec<String>, threshold: f64) -> Result<Self, String> {
        if feature_order.is_empty() {
            return Err("feature list is empty".into());
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(format!("threshold {threshold} must be within [0, 1]"));
        }
        for (i, name) in feature_order.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(format!("feature name at position {i} is blank"));
            }
            if feature_order[..i].contains(name) {
                return Err(format!("duplicate feature name {name:?}"));
            }
        }
        Ok(Self {
            feature_order,
            threshold,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.feature_order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feature_order.is_empty()
    }
}

/// Engineered features derived from one patient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeatures {
    pub iop_cct_ratio: f64,
    pub screen_sleep_ratio: f64,
    pub age_iop: f64,
    pub bp_screen: f64,
}

impl DerivedFeatures {
    #[must_use]
    pub fn compute(input: &PatientInput) -> Self {
        let age = f64::from(input.age);
        let bp_sys = f64::from(input.bp_sys);

        Self {
            iop_cct_ratio: round_to(input.iop / (input.cct + EPSILON), 4),
            screen_sleep_ratio: round_to((input.screen_time_h + 1.0) / (input.sleep_h + EPSILON), 4),
            age_iop: round_to((age * input.iop).sqrt(), 2),
            bp_screen: round_to((bp_sys * input.screen_time_h).ln_1p(), 2),
        }
    }
}

/// Round half away from zero to `places` decimal digits.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Ordered name/value pairs in exactly the order of the schema that built them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Assemble a vector from already-aligned pairs.
    ///
    /// # Errors
    /// Returns an error if a name appears twice.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut values = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if names.contains(&name) {
                return Err(format!("duplicate feature name {name:?}"));
            }
            names.push(name);
            values.push(value);
        }
        Ok(Self { names, values })
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.position(name).map(|i| self.values[i])
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Build the model input vector for one patient, ordered by `schema`.
///
/// # Errors
/// Returns [`SchemaMismatch`] listing every schema name that is neither a raw
/// measurement nor an engineered feature.
pub fn build(input: &PatientInput, schema: &FeatureSchema) -> Result<FeatureVector, SchemaMismatch> {
    let derived = DerivedFeatures::compute(input);

    let assembled: [(&str, f64); 14] = [
        ("age", f64::from(input.age)),
        ("gender", f64::from(input.gender.code())),
        ("iop", input.iop),
        ("cct", input.cct),
        ("heart_rate", f64::from(input.heart_rate)),
        ("bp_sys", f64::from(input.bp_sys)),
        ("screen_time_h", input.screen_time_h),
        ("sleep_h", input.sleep_h),
        ("blink_per_min", f64::from(input.blink_per_min)),
        ("pupil_mm", input.pupil_mm),
        ("iop_cct_ratio", derived.iop_cct_ratio),
        ("screen_sleep_ratio", derived.screen_sleep_ratio),
        ("age_iop", derived.age_iop),
        ("bp_screen", derived.bp_screen),
    ];

    let mut names = Vec::with_capacity(schema.len());
    let mut values = Vec::with_capacity(schema.len());
    let mut missing = Vec::new();

    for name in &schema.feature_order {
        match assembled.iter().find(|(n, _)| n == name) {
            Some((_, value)) => {
                names.push(name.clone());
                values.push(*value);
            }
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(SchemaMismatch { missing });
    }

    Ok(FeatureVector { names, values })
}
