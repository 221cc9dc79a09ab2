//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external formats:
//! - `gbdt`: tree-ensemble scoring oracle with TreeSHAP explanations
//! - `artifact`: SHA-256 manifest and Ed25519 signature checks
//! - `metadata`: feature schema loading with default fallback
//! - `sanitize`: clinical value filtering for logs

pub mod artifact;
pub mod gbdt;
pub mod metadata;
pub mod sanitize;
