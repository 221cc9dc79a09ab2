//! Ranking of per-feature attributions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::FeatureVector;

/// Signed impact per feature name, as returned by a scoring oracle.
pub type Impacts = BTreeMap<String, f64>;

/// Requested a non-positive number of attributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("top-k must be positive, got {0}")]
pub struct InvalidTopK(pub i64);

/// One row of the explanation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
    pub impact: f64,
}

/// Convert a caller-supplied count into a usable K.
///
/// # Errors
/// Returns [`InvalidTopK`] for zero or negative requests.
pub fn top_k(requested: i64) -> Result<usize, InvalidTopK> {
    if requested <= 0 {
        return Err(InvalidTopK(requested));
    }
    usize::try_from(requested).map_err(|_| InvalidTopK(requested))
}

/// Rank attributions by absolute impact, strongest first, keeping at most `k`.
///
/// Rows are seeded in vector order and sorted stably, so equal magnitudes keep
/// the schema order. Impacts for names outside the vector are ignored.
///
/// # Errors
/// Returns [`InvalidTopK`] if `k` is zero.
pub fn rank(vector: &FeatureVector, impacts: &Impacts, k: usize) -> Result<Vec<Attribution>, InvalidTopK> {
    if k == 0 {
        return Err(InvalidTopK(0));
    }

    let mut rows: Vec<Attribution> = vector
        .iter()
        .filter_map(|(name, value)| {
            impacts.get(name).map(|&impact| Attribution {
                feature: name.to_string(),
                value,
                impact,
            })
        })
        .collect();

    rows.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    rows.truncate(k);
    Ok(rows)
}
