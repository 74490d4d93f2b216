use std::fmt;
use std::sync::Arc;

use liefactor_core::{DMat, DVec, LocalParameterization, Real};

use super::{BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};

type ResidualFn = dyn Fn(&[&[Real]]) -> Result<DVec, FactorError> + Send + Sync;

/// Factor around a user residual function, with tangent-space Jacobians from
/// central differences through each block's `plus`.
///
/// Useful for prototyping residuals before writing analytic Jacobians.
pub struct NumericDiffFactor {
    specs: Vec<BlockSpec>,
    residual_dim: usize,
    step: Real,
    func: Box<ResidualFn>,
    parameterizations: Vec<Arc<dyn LocalParameterization>>,
}

impl NumericDiffFactor {
    pub fn new<F>(
        specs: Vec<BlockSpec>,
        residual_dim: usize,
        func: F,
    ) -> Result<Self, ConfigurationError>
    where
        F: Fn(&[&[Real]]) -> Result<DVec, FactorError> + Send + Sync + 'static,
    {
        if residual_dim == 0 {
            return Err(ConfigurationError::UnsupportedFactor(
                "residual dimension must be positive".to_string(),
            ));
        }
        if let Some(bad) = specs.iter().find(|s| !s.kind.compatible_dim(s.size)) {
            return Err(ConfigurationError::UnsupportedFactor(format!(
                "{:?} block cannot have size {}",
                bad.kind, bad.size
            )));
        }
        let parameterizations = specs
            .iter()
            .map(|s| s.kind.parameterization(s.size))
            .collect();
        Ok(Self {
            specs,
            residual_dim,
            step: 1e-6,
            func: Box::new(func),
            parameterizations,
        })
    }

    /// Override the finite-difference step (default `1e-6`).
    pub fn with_step(mut self, step: Real) -> Self {
        self.step = step;
        self
    }

    fn call(&self, params: &[&[Real]]) -> Result<DVec, FactorError> {
        let r = (self.func)(params)?;
        if r.len() != self.residual_dim {
            return Err(FactorError::ResidualSizeMismatch {
                expected: self.residual_dim,
                actual: r.len(),
            });
        }
        Ok(r)
    }
}

impl fmt::Debug for NumericDiffFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumericDiffFactor")
            .field("specs", &self.specs)
            .field("residual_dim", &self.residual_dim)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl Factor for NumericDiffFactor {
    fn residual_dim(&self) -> usize {
        self.residual_dim
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        self.specs.clone()
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let r = self.call(params)?;
        let Some(jac) = jacobians else {
            return Ok(r);
        };

        let mut work: Vec<Vec<Real>> = params.iter().map(|p| p.to_vec()).collect();
        for (block, param) in self.parameterizations.iter().enumerate() {
            let local = param.local_size();
            let mut delta = vec![0.0; local];
            for k in 0..local {
                delta[k] = self.step;
                param.plus(params[block], &delta, &mut work[block])?;
                let fp = self.call(&work.iter().map(Vec::as_slice).collect::<Vec<_>>())?;
                delta[k] = -self.step;
                param.plus(params[block], &delta, &mut work[block])?;
                let fm = self.call(&work.iter().map(Vec::as_slice).collect::<Vec<_>>())?;
                delta[k] = 0.0;
                let col = (fp - fm) / (2.0 * self.step);
                jac[block].set_column(k, &col);
            }
            work[block].copy_from_slice(params[block]);
        }
        Ok(r)
    }
}
