//! Gaussian noise models expressed as square-root information matrices.

use liefactor_core::{DMat, DVec, Real};

use crate::error::ConfigurationError;

/// Square root `Lᵀ` of an information matrix `Ω = L Lᵀ`.
///
/// Whitening a residual `e` gives `Lᵀ e`, so that `|Lᵀ e|² = eᵀ Ω e`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqrtInformation {
    upper: DMat,
}

impl SqrtInformation {
    pub fn identity(dim: usize) -> Self {
        Self {
            upper: DMat::identity(dim, dim),
        }
    }

    /// Factor a symmetric positive definite information matrix.
    pub fn from_information(information: &DMat) -> Result<Self, ConfigurationError> {
        if !information.is_square() || information.nrows() == 0 {
            return Err(ConfigurationError::InvalidInformation);
        }
        if information.iter().any(|v| !v.is_finite()) {
            return Err(ConfigurationError::InvalidInformation);
        }
        let scale = information.amax().max(1.0);
        if (information - information.transpose()).amax() > 1e-9 * scale {
            return Err(ConfigurationError::InvalidInformation);
        }
        let chol = information
            .clone()
            .cholesky()
            .ok_or(ConfigurationError::InvalidInformation)?;
        Ok(Self {
            upper: chol.l().transpose(),
        })
    }

    /// Invert a covariance matrix and factor the resulting information matrix.
    pub fn from_covariance(covariance: &DMat) -> Result<Self, ConfigurationError> {
        if !covariance.is_square() || covariance.nrows() == 0 {
            return Err(ConfigurationError::InvalidInformation);
        }
        let chol = covariance
            .clone()
            .cholesky()
            .ok_or(ConfigurationError::InvalidInformation)?;
        Self::from_information(&chol.inverse())
    }

    /// Independent axes with the given standard deviations.
    pub fn from_sigmas(sigmas: &[Real]) -> Result<Self, ConfigurationError> {
        if sigmas.is_empty() {
            return Err(ConfigurationError::InvalidNoise(
                "no standard deviations given".to_string(),
            ));
        }
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(ConfigurationError::InvalidNoise(format!(
                "standard deviation must be positive and finite, got {bad}"
            )));
        }
        let diag = DVec::from_iterator(sigmas.len(), sigmas.iter().map(|s| 1.0 / s));
        Ok(Self {
            upper: DMat::from_diagonal(&diag),
        })
    }

    pub fn isotropic(dim: usize, sigma: Real) -> Result<Self, ConfigurationError> {
        Self::from_sigmas(&vec![sigma; dim])
    }

    pub fn dim(&self) -> usize {
        self.upper.nrows()
    }

    pub fn matrix(&self) -> &DMat {
        &self.upper
    }

    pub fn whiten(&self, e: &DVec) -> DVec {
        &self.upper * e
    }

    pub fn whiten_jacobian(&self, j: &DMat) -> DMat {
        &self.upper * j
    }

    pub(crate) fn check_dim(&self, expected: usize) -> Result<(), ConfigurationError> {
        if self.dim() != expected {
            return Err(ConfigurationError::InvalidNoise(format!(
                "noise model has dimension {}, residual has {}",
                self.dim(),
                expected
            )));
        }
        Ok(())
    }
}
