//! Local parameterizations: how a tangent update is applied to a parameter block
//! stored in its flat layout.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ManifoldError;
use crate::groups::{LieGroup, Se2, Se3, So2, So3};
use crate::math::{DMat, Real, NORM_TOLERANCE};

/// Supported manifold layouts for parameter blocks.
///
/// Each non-Euclidean variant implies a fixed ambient dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifoldKind {
    /// Plain vector space of any dimension.
    Euclidean,
    /// `[cos, sin]`
    SO2,
    /// `[qw, qx, qy, qz]`
    SO3,
    /// `[cos, sin, tx, ty]`
    SE2,
    /// `[qw, qx, qy, qz, tx, ty, tz]`
    SE3,
}

impl ManifoldKind {
    /// Returns `true` if the given ambient dimension matches the manifold storage.
    pub fn compatible_dim(self, dim: usize) -> bool {
        match self {
            ManifoldKind::Euclidean => dim > 0,
            ManifoldKind::SO2 => dim == So2::REP_SIZE,
            ManifoldKind::SO3 => dim == So3::REP_SIZE,
            ManifoldKind::SE2 => dim == Se2::REP_SIZE,
            ManifoldKind::SE3 => dim == Se3::REP_SIZE,
        }
    }

    /// Tangent dimension for a block of the given ambient size.
    pub fn tangent_dim(self, ambient: usize) -> usize {
        match self {
            ManifoldKind::Euclidean => ambient,
            ManifoldKind::SO2 => So2::DOF,
            ManifoldKind::SO3 => So3::DOF,
            ManifoldKind::SE2 => Se2::DOF,
            ManifoldKind::SE3 => Se3::DOF,
        }
    }

    /// Build the matching parameterization for a block of ambient size `dim`.
    pub fn parameterization(self, dim: usize) -> Arc<dyn LocalParameterization> {
        match self {
            ManifoldKind::Euclidean => Arc::new(EuclideanParameterization::new(dim)),
            ManifoldKind::SO2 => Arc::new(So2Parameterization::default()),
            ManifoldKind::SO3 => Arc::new(So3Parameterization::default()),
            ManifoldKind::SE2 => Arc::new(Se2Parameterization::default()),
            ManifoldKind::SE3 => Arc::new(Se3Parameterization::default()),
        }
    }
}

/// Update rule for a parameter block: `x ⊞ δ` and its Jacobian at `δ = 0`.
pub trait LocalParameterization: Send + Sync + Debug {
    /// Size of the flat layout.
    fn global_size(&self) -> usize;

    /// Size of the tangent update.
    fn local_size(&self) -> usize;

    fn kind(&self) -> ManifoldKind;

    /// Write `x ⊞ delta` into `x_plus`.
    ///
    /// A rotation part slightly off unit norm is renormalized before the update.
    fn plus(&self, x: &[Real], delta: &[Real], x_plus: &mut [Real]) -> Result<(), ManifoldError>;

    /// Jacobian of `x ⊞ δ` with respect to `δ` at `δ = 0`, shape `global × local`.
    fn compute_jacobian(&self, x: &[Real]) -> Result<DMat, ManifoldError>;

    /// Strict check of the representation invariants of `x`.
    fn validate(&self, x: &[Real]) -> Result<(), ManifoldError>;
}

/// Identity parameterization `x ⊞ δ = x + δ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EuclideanParameterization {
    dim: usize,
}

impl EuclideanParameterization {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn check_len(&self, actual: usize) -> Result<(), ManifoldError> {
        if actual != self.dim {
            return Err(ManifoldError::DimensionMismatch {
                manifold: "Euclidean",
                expected: self.dim,
                actual,
            });
        }
        Ok(())
    }
}

impl LocalParameterization for EuclideanParameterization {
    fn global_size(&self) -> usize {
        self.dim
    }

    fn local_size(&self) -> usize {
        self.dim
    }

    fn kind(&self) -> ManifoldKind {
        ManifoldKind::Euclidean
    }

    fn plus(&self, x: &[Real], delta: &[Real], x_plus: &mut [Real]) -> Result<(), ManifoldError> {
        self.check_len(x.len())?;
        self.check_len(delta.len())?;
        self.check_len(x_plus.len())?;
        for ((out, xi), di) in x_plus.iter_mut().zip(x).zip(delta) {
            *out = xi + di;
        }
        Ok(())
    }

    fn compute_jacobian(&self, x: &[Real]) -> Result<DMat, ManifoldError> {
        self.validate(x)?;
        Ok(DMat::identity(self.dim, self.dim))
    }

    fn validate(&self, x: &[Real]) -> Result<(), ManifoldError> {
        self.check_len(x.len())?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ManifoldError::NonFinite {
                manifold: "Euclidean",
            });
        }
        Ok(())
    }
}

/// Right-perturbation parameterization of a Lie group: `x ⊞ δ = x · Exp(δ)`.
#[derive(Debug, Clone, Copy)]
pub struct LieGroupParameterization<G> {
    _group: PhantomData<G>,
}

impl<G> Default for LieGroupParameterization<G> {
    fn default() -> Self {
        Self {
            _group: PhantomData,
        }
    }
}

pub type So2Parameterization = LieGroupParameterization<So2>;
pub type So3Parameterization = LieGroupParameterization<So3>;
pub type Se2Parameterization = LieGroupParameterization<Se2>;
pub type Se3Parameterization = LieGroupParameterization<Se3>;

impl<G: LieGroup> LocalParameterization for LieGroupParameterization<G> {
    fn global_size(&self) -> usize {
        G::REP_SIZE
    }

    fn local_size(&self) -> usize {
        G::DOF
    }

    fn kind(&self) -> ManifoldKind {
        G::KIND
    }

    fn plus(&self, x: &[Real], delta: &[Real], x_plus: &mut [Real]) -> Result<(), ManifoldError> {
        if delta.len() != G::DOF {
            return Err(ManifoldError::DimensionMismatch {
                manifold: G::NAME,
                expected: G::DOF,
                actual: delta.len(),
            });
        }
        if x_plus.len() != G::REP_SIZE {
            return Err(ManifoldError::DimensionMismatch {
                manifold: G::NAME,
                expected: G::REP_SIZE,
                actual: x_plus.len(),
            });
        }
        if delta.iter().any(|v| !v.is_finite()) {
            return Err(ManifoldError::NonFinite { manifold: G::NAME });
        }
        let g = G::from_array_normalized(x)?;
        g.plus(&G::tangent_from_slice(delta)).write_array(x_plus);
        Ok(())
    }

    fn compute_jacobian(&self, x: &[Real]) -> Result<DMat, ManifoldError> {
        let g = G::from_array(x)?;
        Ok(g.plus_jacobian())
    }

    fn validate(&self, x: &[Real]) -> Result<(), ManifoldError> {
        G::from_array(x).map(|_| ())
    }
}

/// `true` if the rotation part of `x` (for layout `kind`) is within the unit-norm tolerance.
pub fn is_normalized(kind: ManifoldKind, x: &[Real]) -> bool {
    let n = match kind {
        ManifoldKind::Euclidean => return true,
        ManifoldKind::SO2 | ManifoldKind::SE2 => 2,
        ManifoldKind::SO3 | ManifoldKind::SE3 => 4,
    };
    if x.len() < n {
        return false;
    }
    let norm = x[..n].iter().map(|v| v * v).sum::<Real>().sqrt();
    (norm - 1.0).abs() <= NORM_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::test_utils::{assert_slices_close, seeded_rng};

    fn check_plus_zero_and_jacobian(p: &dyn LocalParameterization, x: &[Real]) {
        let zero = vec![0.0; p.local_size()];
        let mut out = vec![0.0; p.global_size()];
        p.plus(x, &zero, &mut out).unwrap();
        assert_slices_close(&out, x, 1e-12);

        let jac = p.compute_jacobian(x).unwrap();
        assert_eq!(jac.shape(), (p.global_size(), p.local_size()));
        let h = 1e-6;
        for k in 0..p.local_size() {
            let mut dp = zero.clone();
            let mut dm = zero.clone();
            dp[k] = h;
            dm[k] = -h;
            let mut xp = vec![0.0; p.global_size()];
            let mut xm = vec![0.0; p.global_size()];
            p.plus(x, &dp, &mut xp).unwrap();
            p.plus(x, &dm, &mut xm).unwrap();
            for i in 0..p.global_size() {
                let fd = (xp[i] - xm[i]) / (2.0 * h);
                assert!(
                    (fd - jac[(i, k)]).abs() < 1e-7,
                    "{:?}: jacobian ({i}, {k}) fd {fd} vs {}",
                    p.kind(),
                    jac[(i, k)]
                );
            }
        }
    }

    #[test]
    fn all_parameterizations_agree_with_finite_differences() {
        let mut rng = seeded_rng(42);
        for kind in [
            ManifoldKind::SO2,
            ManifoldKind::SO3,
            ManifoldKind::SE2,
            ManifoldKind::SE3,
        ] {
            let p = kind.parameterization(0);
            let x = match kind {
                ManifoldKind::SO2 => So2::random(&mut rng).to_array(),
                ManifoldKind::SO3 => So3::random(&mut rng).to_array(),
                ManifoldKind::SE2 => Se2::random(&mut rng).to_array(),
                _ => Se3::random(&mut rng).to_array(),
            };
            assert!(kind.compatible_dim(x.len()));
            check_plus_zero_and_jacobian(p.as_ref(), &x);
        }
        let e = EuclideanParameterization::new(3);
        check_plus_zero_and_jacobian(&e, &[1.0, -2.0, 0.5]);
    }

    #[test]
    fn plus_renormalizes_but_jacobian_is_strict() {
        let p = So3Parameterization::default();
        let x = [1.0 + 1e-4, 0.0, 0.0, 0.0];
        let mut out = [0.0; 4];
        p.plus(&x, &[0.0, 0.0, 0.0], &mut out).unwrap();
        assert!(is_normalized(ManifoldKind::SO3, &out));
        assert!(matches!(
            p.compute_jacobian(&x),
            Err(ManifoldError::NotNormalized { .. })
        ));
    }

    #[test]
    fn plus_rejects_wrong_sizes() {
        let p = Se3Parameterization::default();
        let x = Se3::identity().to_array();
        let mut out = [0.0; 7];
        assert!(p.plus(&x, &[0.0; 3], &mut out).is_err());
        let q = So3Parameterization::default();
        assert!(q.plus(&[0.0; 4], &[0.0; 3], &mut [0.0; 4]).is_err());
    }

    #[test]
    fn so3_plus_matches_right_composition() {
        let p = So3Parameterization::default();
        let x = So3::exp(&Vec3::new(0.2, 0.1, -0.3));
        let d = Vec3::new(0.01, -0.02, 0.03);
        let mut out = [0.0; 4];
        p.plus(&x.to_array(), d.as_slice(), &mut out).unwrap();
        let expected = (x * So3::exp(&d)).to_array();
        assert_slices_close(&out, &expected, 1e-12);
    }
}
