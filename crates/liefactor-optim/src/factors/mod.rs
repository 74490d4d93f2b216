//! Residual functions with analytic Jacobians.
//!
//! A factor maps a fixed, ordered list of parameter blocks to a whitened residual
//! vector. Jacobians are reported either with respect to the tangent update of
//! each block (the default) or with respect to the block's flat values, in which
//! case the problem chains them with the block's parameterization.

mod numeric;
mod offset;
mod position;
mod prior;
mod range_bearing;
mod relative;
mod timesync;

pub use numeric::NumericDiffFactor;
pub use offset::{OffsetFactor, Se3OffsetFactor, So3OffsetFactor};
pub use position::{AltFactor, RangeFactor};
pub use prior::{PriorFactor, Se2Factor, Se3Factor, So2Factor, So3Factor};
pub use range_bearing::RangeBearing2DFactor;
pub use relative::{RelSe2Factor, RelSe3Factor, RelSo3Factor, RelativeFactor};
pub use timesync::TimeSyncAttFactor;

use std::fmt::Debug;

use liefactor_core::{DMat, DVec, LieGroup, ManifoldError, ManifoldKind, Real};

use crate::error::FactorError;

/// Expected layout of one parameter block of a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    pub kind: ManifoldKind,
    /// Ambient (stored) size.
    pub size: usize,
}

impl BlockSpec {
    pub const fn new(kind: ManifoldKind, size: usize) -> Self {
        Self { kind, size }
    }

    pub const fn euclidean(size: usize) -> Self {
        Self::new(ManifoldKind::Euclidean, size)
    }

    pub fn of<G: LieGroup>() -> Self {
        Self::new(G::KIND, G::REP_SIZE)
    }

    pub fn tangent_size(&self) -> usize {
        self.kind.tangent_dim(self.size)
    }
}

/// Coordinates the Jacobians of a factor are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JacobianFrame {
    /// `∂r/∂δ` for the tangent update `δ` of each block.
    #[default]
    Tangent,
    /// `∂r/∂x` for the flat values `x` of each block.
    Ambient,
}

/// A residual function over an ordered list of parameter blocks.
pub trait Factor: Send + Sync + Debug {
    /// Length of the residual vector.
    fn residual_dim(&self) -> usize;

    /// Layout of each parameter block, in order.
    fn parameter_specs(&self) -> Vec<BlockSpec>;

    fn jacobian_frame(&self) -> JacobianFrame {
        JacobianFrame::Tangent
    }

    /// Evaluate the whitened residual.
    ///
    /// When `jacobians` is given it holds one pre-sized matrix per block
    /// (`residual_dim × tangent size` or `residual_dim × ambient size`,
    /// depending on [`Factor::jacobian_frame`]) and must be filled in.
    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError>;
}

/// Largest `| |rotation part| - 1 |` a factor renormalizes before evaluating.
pub(crate) const NORM_DRIFT_TOLERANCE: Real = 1e-3;

/// Parse a parameter block as a group element, renormalizing drift up to
/// [`NORM_DRIFT_TOLERANCE`] in the rotation norm.
pub(crate) fn group_from<G: LieGroup>(values: &[Real]) -> Result<G, FactorError> {
    let g = G::from_array_normalized(values)?;
    let norm = values[..G::ROTATION_SIZE]
        .iter()
        .map(|v| v * v)
        .sum::<Real>()
        .sqrt();
    if (norm - 1.0).abs() > NORM_DRIFT_TOLERANCE {
        return Err(ManifoldError::NotNormalized {
            manifold: G::NAME,
            norm,
        }
        .into());
    }
    Ok(g)
}
