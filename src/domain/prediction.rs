//! Prediction result types.
//!
//! Represents the output of one glaucoma risk evaluation.

use serde::{Deserialize, Serialize};

use super::attribution::Attribution;

/// Binary risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    /// Negative class (code 0)
    Low,
    /// Positive class (code 1)
    High,
}

impl RiskLabel {
    /// Class code as produced by the classifier.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        matches!(self, Self::High)
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk",
            Self::High => "High risk - patient may need clinical evaluation",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Threshold a class-1 probability into a risk label.
///
/// The boundary is inclusive: `probability == threshold` is positive.
#[must_use]
pub fn decide(probability: f64, threshold: f64) -> RiskLabel {
    if probability >= threshold {
        RiskLabel::High
    } else {
        RiskLabel::Low
    }
}

/// Complete result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability of the positive class (0.0 to 1.0)
    pub probability: f64,

    /// Thresholded label
    pub label: RiskLabel,

    /// Threshold the label was decided with
    pub threshold: f64,

    /// Top contributions, strongest first
    pub attributions: Vec<Attribution>,
}
