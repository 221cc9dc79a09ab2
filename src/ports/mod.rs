//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the evaluation pipeline and the model runtime.

mod scoring_oracle;

pub use scoring_oracle::{OracleError, ScoringOracle};
