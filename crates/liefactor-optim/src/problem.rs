//! Problem builder: parameter blocks, residual blocks and their evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use liefactor_core::{DMat, DVec, LocalParameterization, ManifoldKind, Real};
use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{ConfigurationError, FactorError, SolveError};
use crate::factors::{Factor, JacobianFrame};
use crate::linear::BlockJacobian;
use crate::robust::RobustLoss;

/// Identifier for a parameter block, stable for the lifetime of a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub usize);

/// Identifier for a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResidualId(pub usize);

/// Named parameter storage with an optional local parameterization.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    name: String,
    values: Vec<Real>,
    parameterization: Option<Arc<dyn LocalParameterization>>,
    constant: bool,
}

impl ParameterBlock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Real] {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Tangent size used by the solver.
    pub fn local_size(&self) -> usize {
        self.parameterization
            .as_ref()
            .map_or(self.values.len(), |p| p.local_size())
    }

    pub fn kind(&self) -> ManifoldKind {
        self.parameterization
            .as_ref()
            .map_or(ManifoldKind::Euclidean, |p| p.kind())
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn parameterization(&self) -> Option<&Arc<dyn LocalParameterization>> {
        self.parameterization.as_ref()
    }

    fn plus(&self, delta: &[Real], out: &mut [Real]) -> Result<(), SolveError> {
        match &self.parameterization {
            Some(p) => p.plus(&self.values, delta, out)?,
            None => {
                for ((o, x), d) in out.iter_mut().zip(&self.values).zip(delta) {
                    *o = x + d;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ResidualBlock {
    factor: Box<dyn Factor>,
    loss: RobustLoss,
    params: Vec<ParamId>,
}

/// Result of evaluating all residual blocks at the current values.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// `½ Σ ρ(|r_i|²)`
    pub cost: Real,
    /// Whitened residuals stacked in residual block order (before robust scaling).
    pub residuals: DVec,
}

/// Column layout of the free (non-constant) parameter blocks.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    offsets: Vec<Option<usize>>,
    num_cols: usize,
}

impl Layout {
    pub(crate) fn num_cols(&self) -> usize {
        self.num_cols
    }
}

/// Residuals and Jacobian of all blocks, after robust re-weighting.
#[derive(Debug, Clone)]
pub(crate) struct Linearization {
    pub cost: Real,
    pub residual: DVec,
    pub jacobian: BlockJacobian,
}

/// Where residual blocks are evaluated.
pub(crate) enum Executor {
    Sequential,
    /// rayon's global pool.
    Global,
    Pool(rayon::ThreadPool),
}

impl Executor {
    /// `1` evaluates sequentially, `0` uses the global pool, `n` a dedicated pool of `n` threads.
    pub(crate) fn new(num_threads: usize) -> Self {
        match num_threads {
            0 => Executor::Global,
            1 => Executor::Sequential,
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Executor::Pool(pool),
                Err(err) => {
                    warn!("failed to build a {n}-thread pool ({err}), using the global pool");
                    Executor::Global
                }
            },
        }
    }
}

struct BlockEval {
    cost: Real,
    raw: DVec,
    weighted: DVec,
    jacobians: Vec<(usize, DMat)>,
}

/// A nonlinear least-squares problem over manifold-valued parameter blocks.
///
/// The problem owns all parameter storage; [`crate::solve`] updates it in place
/// and callers read results back through [`Problem::parameter_block`] or
/// [`Problem::values_by_name`].
#[derive(Debug, Default)]
pub struct Problem {
    params: Vec<ParameterBlock>,
    residuals: Vec<ResidualBlock>,
    names: HashMap<String, ParamId>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter block.
    ///
    /// Non-Euclidean values must already satisfy their manifold invariant
    /// (unit-norm rotation part).
    pub fn add_parameter_block(
        &mut self,
        name: impl Into<String>,
        values: Vec<Real>,
        parameterization: Option<Arc<dyn LocalParameterization>>,
    ) -> Result<ParamId, ConfigurationError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ConfigurationError::DuplicateParameterName(name));
        }
        if values.is_empty() {
            return Err(ConfigurationError::BlockSizeMismatch {
                name,
                expected: 1,
                actual: 0,
            });
        }
        if let Some(p) = &parameterization {
            if p.global_size() != values.len() {
                return Err(ConfigurationError::ParameterizationSizeMismatch {
                    name,
                    expected: p.global_size(),
                    actual: values.len(),
                });
            }
            p.validate(&values)?;
        } else if values.iter().any(|v| !v.is_finite()) {
            return Err(liefactor_core::ManifoldError::NonFinite {
                manifold: "Euclidean",
            }
            .into());
        }

        let id = ParamId(self.params.len());
        self.names.insert(name.clone(), id);
        self.params.push(ParameterBlock {
            name,
            values,
            parameterization,
            constant: false,
        });
        Ok(id)
    }

    /// Register a parameter block using the standard parameterization for `kind`.
    pub fn add_manifold_block(
        &mut self,
        name: impl Into<String>,
        values: Vec<Real>,
        kind: ManifoldKind,
    ) -> Result<ParamId, ConfigurationError> {
        let parameterization = match kind {
            ManifoldKind::Euclidean => None,
            other => Some(other.parameterization(values.len())),
        };
        self.add_parameter_block(name, values, parameterization)
    }

    pub fn set_parameter_block_constant(&mut self, id: ParamId) -> Result<(), ConfigurationError> {
        self.block_mut(id)?.constant = true;
        Ok(())
    }

    pub fn set_parameter_block_variable(&mut self, id: ParamId) -> Result<(), ConfigurationError> {
        self.block_mut(id)?.constant = false;
        Ok(())
    }

    pub fn is_parameter_block_constant(&self, id: ParamId) -> Result<bool, ConfigurationError> {
        Ok(self.parameter_block(id)?.constant)
    }

    /// Overwrite the values of a block, validating the manifold invariant.
    pub fn set_parameter_values(
        &mut self,
        id: ParamId,
        values: &[Real],
    ) -> Result<(), ConfigurationError> {
        let block = self.block_mut(id)?;
        if values.len() != block.values.len() {
            return Err(ConfigurationError::BlockSizeMismatch {
                name: block.name.clone(),
                expected: block.values.len(),
                actual: values.len(),
            });
        }
        if let Some(p) = &block.parameterization {
            p.validate(values)?;
        }
        block.values.copy_from_slice(values);
        Ok(())
    }

    /// Add a residual block connecting `factor` to `params` (in the factor's order).
    pub fn add_residual_block<F: Factor + 'static>(
        &mut self,
        factor: F,
        loss: Option<RobustLoss>,
        params: &[ParamId],
    ) -> Result<ResidualId, ConfigurationError> {
        self.add_boxed_residual_block(Box::new(factor), loss, params)
    }

    pub fn add_boxed_residual_block(
        &mut self,
        factor: Box<dyn Factor>,
        loss: Option<RobustLoss>,
        params: &[ParamId],
    ) -> Result<ResidualId, ConfigurationError> {
        if factor.residual_dim() == 0 {
            return Err(ConfigurationError::UnsupportedFactor(
                "residual dimension must be positive".to_string(),
            ));
        }
        let specs = factor.parameter_specs();
        if specs.len() != params.len() {
            return Err(ConfigurationError::ParameterCountMismatch {
                expected: specs.len(),
                actual: params.len(),
            });
        }
        for (i, (spec, id)) in specs.iter().zip(params).enumerate() {
            let block = self.parameter_block(*id)?;
            if params[..i].contains(id) {
                return Err(ConfigurationError::DuplicateParameterInResidual(
                    block.name.clone(),
                ));
            }
            if block.size() != spec.size {
                return Err(ConfigurationError::BlockSizeMismatch {
                    name: block.name.clone(),
                    expected: spec.size,
                    actual: block.size(),
                });
            }
            if factor.jacobian_frame() == JacobianFrame::Tangent && block.kind() != spec.kind {
                return Err(ConfigurationError::ManifoldMismatch {
                    name: block.name.clone(),
                    expected: spec.kind,
                    actual: block.kind(),
                });
            }
        }
        let loss = loss.unwrap_or_default();
        if !loss.is_valid() {
            return Err(ConfigurationError::InvalidNoise(format!(
                "invalid robust loss {loss:?}"
            )));
        }

        let id = ResidualId(self.residuals.len());
        self.residuals.push(ResidualBlock {
            factor,
            loss,
            params: params.to_vec(),
        });
        Ok(id)
    }

    pub fn parameter_block(&self, id: ParamId) -> Result<&ParameterBlock, ConfigurationError> {
        self.params
            .get(id.0)
            .ok_or(ConfigurationError::UnknownParameterBlock(id))
    }

    fn block_mut(&mut self, id: ParamId) -> Result<&mut ParameterBlock, ConfigurationError> {
        self.params
            .get_mut(id.0)
            .ok_or(ConfigurationError::UnknownParameterBlock(id))
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.names.get(name).copied()
    }

    pub fn values_by_name(&self, name: &str) -> Result<&[Real], ConfigurationError> {
        let id = self
            .param_by_name(name)
            .ok_or_else(|| ConfigurationError::UnknownParameterName(name.to_string()))?;
        Ok(self.parameter_block(id)?.values())
    }

    pub fn parameter_blocks(&self) -> impl Iterator<Item = (ParamId, &ParameterBlock)> {
        self.params.iter().enumerate().map(|(i, b)| (ParamId(i), b))
    }

    pub fn num_parameter_blocks(&self) -> usize {
        self.params.len()
    }

    pub fn num_residual_blocks(&self) -> usize {
        self.residuals.len()
    }

    /// Total residual dimension.
    pub fn num_residuals(&self) -> usize {
        self.residuals.iter().map(|r| r.factor.residual_dim()).sum()
    }

    /// Number of tangent dimensions that the solver updates.
    pub fn num_effective_parameters(&self) -> usize {
        self.layout().num_cols
    }

    /// Evaluate the cost and stacked residuals at the current values.
    pub fn evaluate(&self) -> Result<Evaluation, SolveError> {
        let mut cost = 0.0;
        let mut residuals = Vec::with_capacity(self.num_residuals());
        for idx in 0..self.residuals.len() {
            let eval = self.evaluate_block_with(idx, None, None, true)?;
            cost += eval.cost;
            residuals.extend_from_slice(eval.raw.as_slice());
        }
        Ok(Evaluation {
            cost,
            residuals: DVec::from_vec(residuals),
        })
    }

    /// Total cost `½ Σ ρ(|r_i|²)` at the current values.
    pub fn cost(&self) -> Result<Real, SolveError> {
        Ok(self.evaluate()?.cost)
    }

    /// Dense Jacobian of the whitened residuals with respect to the tangent
    /// updates of all free blocks (robust losses not applied).
    pub fn jacobian(&self) -> Result<DMat, SolveError> {
        let layout = self.layout();
        let lin = self.linearize_with(&layout, &Executor::Sequential, false)?;
        Ok(lin.jacobian.to_dense())
    }

    pub(crate) fn layout(&self) -> Layout {
        let mut offsets = Vec::with_capacity(self.params.len());
        let mut num_cols = 0;
        for block in &self.params {
            if block.constant {
                offsets.push(None);
            } else {
                offsets.push(Some(num_cols));
                num_cols += block.local_size();
            }
        }
        Layout { offsets, num_cols }
    }

    fn gather<'a>(
        &'a self,
        rb: &ResidualBlock,
        values: Option<&'a [Vec<Real>]>,
    ) -> Vec<&'a [Real]> {
        rb.params
            .iter()
            .map(|id| match values {
                Some(v) => v[id.0].as_slice(),
                None => self.params[id.0].values.as_slice(),
            })
            .collect()
    }

    /// Evaluate one residual block, optionally at candidate values and with
    /// tangent-space Jacobians placed at `layout` columns.
    fn evaluate_block_with(
        &self,
        idx: usize,
        values: Option<&[Vec<Real>]>,
        layout: Option<&Layout>,
        robust: bool,
    ) -> Result<BlockEval, SolveError> {
        let rb = &self.residuals[idx];
        let factor_err = |source: FactorError| SolveError::Factor {
            residual: idx,
            source,
        };
        let slices = self.gather(rb, values);
        let dim = rb.factor.residual_dim();
        let frame = rb.factor.jacobian_frame();

        let mut jacs: Option<Vec<DMat>> = layout.map(|_| {
            rb.params
                .iter()
                .map(|id| {
                    let block = &self.params[id.0];
                    let cols = match frame {
                        JacobianFrame::Tangent => block.local_size(),
                        JacobianFrame::Ambient => block.size(),
                    };
                    DMat::zeros(dim, cols)
                })
                .collect()
        });

        let raw = rb
            .factor
            .evaluate(&slices, jacs.as_deref_mut())
            .map_err(factor_err)?;
        if raw.len() != dim {
            return Err(factor_err(FactorError::ResidualSizeMismatch {
                expected: dim,
                actual: raw.len(),
            }));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(factor_err(FactorError::NonFiniteResidual));
        }

        let (rho, weight) = if robust {
            rb.loss.rho_and_weight(raw.norm_squared())
        } else {
            (raw.norm_squared(), 1.0)
        };
        let sqrt_w = weight.sqrt();

        let mut jacobians = Vec::new();
        if let (Some(layout), Some(jacs)) = (layout, jacs) {
            for ((id, jac), x) in rb.params.iter().zip(jacs).zip(&slices) {
                let Some(col) = layout.offsets[id.0] else {
                    continue;
                };
                let block = &self.params[id.0];
                let jac = match (frame, &block.parameterization) {
                    (JacobianFrame::Ambient, Some(p)) => jac * p.compute_jacobian(x)?,
                    _ => jac,
                };
                jacobians.push((col, jac * sqrt_w));
            }
        }

        Ok(BlockEval {
            cost: 0.5 * rho,
            weighted: &raw * sqrt_w,
            raw,
            jacobians,
        })
    }

    /// Evaluate every residual block with the given executor.
    fn evaluate_all(
        &self,
        values: Option<&[Vec<Real>]>,
        layout: Option<&Layout>,
        exec: &Executor,
        robust: bool,
    ) -> Result<Vec<BlockEval>, SolveError> {
        let n = self.residuals.len();
        let run = || -> Result<Vec<BlockEval>, SolveError> {
            (0..n)
                .into_par_iter()
                .map(|idx| self.evaluate_block_with(idx, values, layout, robust))
                .collect()
        };
        match exec {
            Executor::Sequential => (0..n)
                .map(|idx| self.evaluate_block_with(idx, values, layout, robust))
                .collect(),
            Executor::Global => run(),
            Executor::Pool(pool) => pool.install(run),
        }
    }

    pub(crate) fn linearize_with(
        &self,
        layout: &Layout,
        exec: &Executor,
        robust: bool,
    ) -> Result<Linearization, SolveError> {
        let evals = self.evaluate_all(None, Some(layout), exec, robust)?;
        let nrows: usize = evals.iter().map(|e| e.weighted.len()).sum();
        let mut residual = DVec::zeros(nrows);
        let mut jacobian = BlockJacobian::new(nrows, layout.num_cols);
        let mut cost = 0.0;
        let mut row = 0;
        for eval in evals {
            let m = eval.weighted.len();
            residual.rows_mut(row, m).copy_from(&eval.weighted);
            for (col, block) in eval.jacobians {
                jacobian.push(row, col, block);
            }
            cost += eval.cost;
            row += m;
        }
        Ok(Linearization {
            cost,
            residual,
            jacobian,
        })
    }

    /// Total robust cost at candidate values.
    pub(crate) fn cost_at(
        &self,
        values: &[Vec<Real>],
        exec: &Executor,
    ) -> Result<Real, SolveError> {
        let evals = self.evaluate_all(Some(values), None, exec, true)?;
        Ok(evals.iter().map(|e| e.cost).sum())
    }

    /// Apply a stacked tangent step to all free blocks, returning the new values
    /// without touching the stored ones.
    pub(crate) fn candidate(
        &self,
        layout: &Layout,
        step: &DVec,
    ) -> Result<Vec<Vec<Real>>, SolveError> {
        let mut out = Vec::with_capacity(self.params.len());
        for (block, offset) in self.params.iter().zip(&layout.offsets) {
            let mut values = block.values.clone();
            if let Some(col) = offset {
                let delta = &step.as_slice()[*col..*col + block.local_size()];
                block.plus(delta, &mut values)?;
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Store accepted values. Constant blocks are skipped so their storage is never written.
    pub(crate) fn commit(&mut self, values: Vec<Vec<Real>>) {
        for (block, new) in self.params.iter_mut().zip(values) {
            if !block.constant {
                block.values = new;
            }
        }
    }

    /// Euclidean norm of the stored values of all free blocks.
    pub(crate) fn free_values_norm(&self) -> Real {
        self.params
            .iter()
            .filter(|b| !b.constant)
            .flat_map(|b| b.values.iter())
            .map(|v| v * v)
            .sum::<Real>()
            .sqrt()
    }

    pub(crate) fn log_structure(&self) {
        debug!(
            "problem: {} parameter blocks ({} constant), {} residual blocks, {} residuals",
            self.params.len(),
            self.params.iter().filter(|b| b.constant).count(),
            self.residuals.len(),
            self.num_residuals()
        );
    }
}
