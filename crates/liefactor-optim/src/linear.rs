//! Block-sparse Jacobians and the damped linear solves of the trust region step.

use faer::linalg::solvers::Solve;
use faer::sparse::{SparseColMat, Triplet};
use faer::{Mat, Side};
use liefactor_core::{DMat, DVec, Real};
use log::trace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Linear solver used for the damped normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverType {
    /// QR of the augmented system `[J; sqrt(D)] δ = [-r; 0]`.
    #[default]
    DenseQr,
    /// Dense Cholesky of `JᵀJ + D`.
    DenseNormalCholesky,
    /// Sparse Cholesky of `JᵀJ + D` (faer).
    SparseNormalCholesky,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinearSolverError {
    #[error("normal equations are not positive definite")]
    NotPositiveDefinite,
    #[error("system is rank deficient")]
    RankDeficient,
    #[error("solution contains non-finite values")]
    NonFinite,
}

/// Jacobian stored as dense blocks at `(row, col)` offsets.
///
/// Blocks of one residual share a row band and are pushed consecutively.
#[derive(Debug, Clone)]
pub struct BlockJacobian {
    nrows: usize,
    ncols: usize,
    blocks: Vec<(usize, usize, DMat)>,
}

impl BlockJacobian {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, row: usize, col: usize, block: DMat) {
        debug_assert!(row + block.nrows() <= self.nrows);
        debug_assert!(col + block.ncols() <= self.ncols);
        self.blocks.push((row, col, block));
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn to_dense(&self) -> DMat {
        let mut out = DMat::zeros(self.nrows, self.ncols);
        for (r, c, b) in &self.blocks {
            let mut view = out.view_mut((*r, *c), b.shape());
            view += b;
        }
        out
    }

    /// Nonzero entries of `JᵀJ`. Duplicates are summed on assembly.
    pub fn normal_triplets(&self) -> Vec<Triplet<usize, usize, Real>> {
        let mut out = Vec::new();
        for band in self.blocks.chunk_by(|a, b| a.0 == b.0) {
            for (_, ci, bi) in band {
                for (_, cj, bj) in band {
                    let prod = bi.tr_mul(bj);
                    for j in 0..prod.ncols() {
                        for i in 0..prod.nrows() {
                            let v = prod[(i, j)];
                            if v != 0.0 {
                                out.push(Triplet::new(ci + i, cj + j, v));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// `J x`
    pub fn mul_vec(&self, x: &DVec) -> DVec {
        let mut out = DVec::zeros(self.nrows);
        for (r, c, b) in &self.blocks {
            let mut rows = out.rows_mut(*r, b.nrows());
            rows += b * x.rows(*c, b.ncols());
        }
        out
    }

    /// `Jᵀ y`
    pub fn tr_mul_vec(&self, y: &DVec) -> DVec {
        let mut out = DVec::zeros(self.ncols);
        for (r, c, b) in &self.blocks {
            let mut rows = out.rows_mut(*c, b.ncols());
            rows += b.tr_mul(&y.rows(*r, b.nrows()));
        }
        out
    }

    /// Diagonal of `JᵀJ` (squared column norms).
    pub fn column_norms_squared(&self) -> DVec {
        let mut out = DVec::zeros(self.ncols);
        for (_, c, b) in &self.blocks {
            for j in 0..b.ncols() {
                out[c + j] += b.column(j).norm_squared();
            }
        }
        out
    }
}

/// Solve `(JᵀJ + diag(d)) δ = -Jᵀ r` for the step `δ`.
pub fn solve_damped(
    kind: LinearSolverType,
    jacobian: &BlockJacobian,
    residual: &DVec,
    damping: &DVec,
) -> Result<DVec, LinearSolverError> {
    let step = match kind {
        LinearSolverType::DenseQr => solve_dense_qr(jacobian, residual, damping)?,
        LinearSolverType::DenseNormalCholesky => {
            solve_dense_cholesky(jacobian, residual, damping)?
        }
        LinearSolverType::SparseNormalCholesky => {
            solve_sparse_cholesky(jacobian, residual, damping)?
        }
    };
    if step.iter().any(|v| !v.is_finite()) {
        return Err(LinearSolverError::NonFinite);
    }
    trace!("{:?} step norm {:.3e}", kind, step.norm());
    Ok(step)
}

fn solve_dense_qr(
    jacobian: &BlockJacobian,
    residual: &DVec,
    damping: &DVec,
) -> Result<DVec, LinearSolverError> {
    let (m, n) = (jacobian.nrows(), jacobian.ncols());
    let mut a = DMat::zeros(m + n, n);
    a.view_mut((0, 0), (m, n)).copy_from(&jacobian.to_dense());
    for i in 0..n {
        a[(m + i, i)] = damping[i].sqrt();
    }
    let mut b = DVec::zeros(m + n);
    b.rows_mut(0, m).copy_from(&(-residual));

    let qr = a.qr();
    let r = qr.r();
    let scale = r.diagonal().amax().max(1.0);
    if r.diagonal().iter().any(|d| d.abs() <= Real::EPSILON * scale) {
        return Err(LinearSolverError::RankDeficient);
    }
    let qtb = qr.q().tr_mul(&b);
    r.solve_upper_triangular(&qtb)
        .ok_or(LinearSolverError::RankDeficient)
}

fn solve_dense_cholesky(
    jacobian: &BlockJacobian,
    residual: &DVec,
    damping: &DVec,
) -> Result<DVec, LinearSolverError> {
    let j = jacobian.to_dense();
    let mut h = j.tr_mul(&j);
    for i in 0..h.nrows() {
        h[(i, i)] += damping[i];
    }
    let g = j.tr_mul(residual);
    let chol = h.cholesky().ok_or(LinearSolverError::NotPositiveDefinite)?;
    Ok(chol.solve(&(-g)))
}

fn solve_sparse_cholesky(
    jacobian: &BlockJacobian,
    residual: &DVec,
    damping: &DVec,
) -> Result<DVec, LinearSolverError> {
    let n = jacobian.ncols();
    let mut triplets = jacobian.normal_triplets();
    triplets.extend((0..n).map(|i| Triplet::new(i, i, damping[i])));
    let h = SparseColMat::<usize, Real>::try_new_from_triplets(n, n, &triplets)
        .map_err(|_| LinearSolverError::NotPositiveDefinite)?;
    let llt = h
        .as_ref()
        .sp_cholesky(Side::Lower)
        .map_err(|_| LinearSolverError::NotPositiveDefinite)?;

    let g = jacobian.tr_mul_vec(residual);
    let rhs = Mat::from_fn(n, 1, |i, _| -g[i]);
    let x = llt.solve(&rhs);
    Ok(DVec::from_fn(n, |i, _| x[(i, 0)]))
}
