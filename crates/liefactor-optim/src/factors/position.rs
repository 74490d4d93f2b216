//! Scalar measurements on a 3D position block `[x, y, z]`.

use liefactor_core::{DMat, DVec, Real, Vec3};

use super::{BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};

fn check_sigma(sigma: Real) -> Result<(), ConfigurationError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(ConfigurationError::InvalidNoise(format!(
            "standard deviation must be positive, got {sigma}"
        )));
    }
    Ok(())
}

/// Distance from a fixed anchor, e.g. a UWB beacon: `(|p - anchor| - range) / sigma`.
#[derive(Debug, Clone)]
pub struct RangeFactor {
    range: Real,
    sigma: Real,
    anchor: Vec3,
}

impl RangeFactor {
    pub fn new(range: Real, sigma: Real, anchor: Vec3) -> Result<Self, ConfigurationError> {
        check_sigma(sigma)?;
        Ok(Self {
            range,
            sigma,
            anchor,
        })
    }
}

impl Factor for RangeFactor {
    fn residual_dim(&self) -> usize {
        1
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::euclidean(3)]
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let p = Vec3::new(params[0][0], params[0][1], params[0][2]);
        let delta = p - self.anchor;
        let dist = delta.norm();
        if dist < Real::EPSILON {
            return Err(FactorError::Evaluation(
                "position coincides with the range anchor".to_string(),
            ));
        }
        if let Some(jac) = jacobians {
            let g = delta / (dist * self.sigma);
            jac[0] = DMat::from_row_slice(1, 3, g.as_slice());
        }
        Ok(DVec::from_element(1, (dist - self.range) / self.sigma))
    }
}

/// Altitude measurement on the `z` axis (z up): `(p_z - altitude) / sigma`.
#[derive(Debug, Clone)]
pub struct AltFactor {
    altitude: Real,
    sigma: Real,
}

impl AltFactor {
    pub fn new(altitude: Real, sigma: Real) -> Result<Self, ConfigurationError> {
        check_sigma(sigma)?;
        Ok(Self { altitude, sigma })
    }
}

impl Factor for AltFactor {
    fn residual_dim(&self) -> usize {
        1
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::euclidean(3)]
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        if let Some(jac) = jacobians {
            jac[0] = DMat::from_row_slice(1, 3, &[0.0, 0.0, 1.0 / self.sigma]);
        }
        Ok(DVec::from_element(
            1,
            (params[0][2] - self.altitude) / self.sigma,
        ))
    }
}
