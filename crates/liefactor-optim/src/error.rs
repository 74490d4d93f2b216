use liefactor_core::{ManifoldError, ManifoldKind};
use thiserror::Error;

use crate::problem::ParamId;

/// Invalid problem setup, detected when blocks or factors are added.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown parameter block {0:?}")]
    UnknownParameterBlock(ParamId),
    #[error("unknown parameter block name `{0}`")]
    UnknownParameterName(String),
    #[error("parameter block name `{0}` is already in use")]
    DuplicateParameterName(String),
    #[error("parameterization expects {expected} values, block `{name}` has {actual}")]
    ParameterizationSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("factor expects {expected} parameter blocks, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[error("parameter block `{name}` has size {actual}, factor expects {expected}")]
    BlockSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("parameter block `{name}` is {actual:?}, factor expects {expected:?}")]
    ManifoldMismatch {
        name: String,
        expected: ManifoldKind,
        actual: ManifoldKind,
    },
    #[error("parameter block `{0}` appears more than once in a residual block")]
    DuplicateParameterInResidual(String),
    #[error("information matrix is not symmetric positive definite")]
    InvalidInformation,
    #[error("invalid noise model: {0}")]
    InvalidNoise(String),
    #[error("invalid solver option: {0}")]
    InvalidOption(String),
    #[error("unsupported factor: {0}")]
    UnsupportedFactor(String),
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}

/// Failure while evaluating a single factor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactorError {
    #[error("residual contains non-finite values")]
    NonFiniteResidual,
    #[error("factor returned {actual} residuals, expected {expected}")]
    ResidualSizeMismatch { expected: usize, actual: usize },
    #[error("{0}")]
    Evaluation(String),
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}

/// Errors returned by [`crate::solve`] for problems that cannot be started.
///
/// Numerical trouble during the iterations is reported through the summary's
/// termination status instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("residual block {residual}: {source}")]
    Factor {
        residual: usize,
        #[source]
        source: FactorError,
    },
    #[error(transparent)]
    Manifold(#[from] ManifoldError),
}
