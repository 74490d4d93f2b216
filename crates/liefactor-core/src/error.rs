use thiserror::Error;

/// Violations of a manifold value's representation invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ManifoldError {
    #[error("{manifold}: expected {expected} values, got {actual}")]
    DimensionMismatch {
        manifold: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{manifold}: rotation part is not unit norm (norm = {norm})")]
    NotNormalized { manifold: &'static str, norm: f64 },
    #[error("{manifold}: non-finite value in input")]
    NonFinite { manifold: &'static str },
    #[error("{manifold}: degenerate input ({reason})")]
    Degenerate {
        manifold: &'static str,
        reason: &'static str,
    },
}
