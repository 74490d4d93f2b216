//! Matrix Lie groups used as optimization variables.
//!
//! Every group has a flat (over-parameterized) array layout used for parameter
//! block storage and a minimal tangent vector used for updates:
//!
//! | group | flat layout | tangent |
//! |---|---|---|
//! | [`So2`] | `[cos, sin]` | `[theta]` |
//! | [`So3`] | `[qw, qx, qy, qz]` | `[theta_x, theta_y, theta_z]` |
//! | [`Se2`] | `[cos, sin, tx, ty]` | `[rho_x, rho_y, theta]` |
//! | [`Se3`] | `[qw, qx, qy, qz, tx, ty, tz]` | `[rho_x, rho_y, rho_z, theta_x, theta_y, theta_z]` |
//!
//! Perturbations are applied on the right: `x ⊕ δ = x · Exp(δ)` and
//! `a ⊖ b = Log(b⁻¹ · a)`.

mod se2;
mod se3;
mod so2;
mod so3;

pub use se2::Se2;
pub use se3::Se3;
pub use so2::So2;
pub use so3::So3;

use std::fmt::Debug;
use std::ops::{Add, Mul, Neg};

use rand::Rng;

use crate::error::ManifoldError;
use crate::math::{DMat, DVec, Real, NORM_TOLERANCE};
use crate::parameterization::ManifoldKind;

/// Common interface of the Lie groups in this crate.
pub trait LieGroup: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Short group name used in error messages.
    const NAME: &'static str;
    /// Length of the flat array layout.
    const REP_SIZE: usize;
    /// Number of degrees of freedom (tangent dimension).
    const DOF: usize;
    /// Number of leading flat entries that form the unit-norm rotation part.
    const ROTATION_SIZE: usize;
    /// Manifold kind matching this group's layout.
    const KIND: ManifoldKind;

    type Tangent: Copy
        + Debug
        + PartialEq
        + Send
        + Sync
        + Neg<Output = Self::Tangent>
        + Add<Output = Self::Tangent>
        + Mul<Real, Output = Self::Tangent>;

    fn identity() -> Self;

    /// Draw a random element. Rotations are uniform, translations uniform in `[-1, 1]`.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Group product `self · other`.
    fn compose(&self, other: &Self) -> Self;

    fn inverse(&self) -> Self;

    fn exp(v: &Self::Tangent) -> Self;

    /// Logarithm map. The rotation angle of the result lies in `[0, pi]`.
    fn log(&self) -> Self::Tangent;

    /// Adjoint matrix: `self · Exp(v) · self⁻¹ = Exp(Ad · v)`.
    fn adjoint(&self) -> DMat;

    /// Right Jacobian of `Exp`: `Exp(v + dv) ≈ Exp(v) · Exp(Jr(v) dv)`.
    fn right_jacobian(v: &Self::Tangent) -> DMat;

    fn right_jacobian_inv(v: &Self::Tangent) -> DMat;

    /// Jacobian of the flat array of `self · Exp(δ)` with respect to `δ` at `δ = 0`.
    fn plus_jacobian(&self) -> DMat;

    /// Build from a flat slice of length `REP_SIZE`, renormalizing the rotation part.
    ///
    /// Length and finiteness are the caller's responsibility; see [`LieGroup::from_array`].
    fn from_unit_slice(values: &[Real]) -> Self;

    /// Write the flat layout into `out` (length `REP_SIZE`).
    fn write_array(&self, out: &mut [Real]);

    fn tangent_from_slice(v: &[Real]) -> Self::Tangent;

    fn tangent_to_dvec(v: &Self::Tangent) -> DVec;

    fn left_jacobian(v: &Self::Tangent) -> DMat {
        Self::right_jacobian(&-*v)
    }

    fn left_jacobian_inv(v: &Self::Tangent) -> DMat {
        Self::right_jacobian_inv(&-*v)
    }

    /// Right plus: `self · Exp(delta)`.
    fn plus(&self, delta: &Self::Tangent) -> Self {
        self.compose(&Self::exp(delta))
    }

    /// Left plus: `Exp(delta) · self`.
    fn lplus(&self, delta: &Self::Tangent) -> Self {
        Self::exp(delta).compose(self)
    }

    /// Right minus: `Log(other⁻¹ · self)`.
    fn minus(&self, other: &Self) -> Self::Tangent {
        other.inverse().compose(self).log()
    }

    /// `true` when `self ⊖ other` has norm at most `tol`.
    fn is_approx(&self, other: &Self, tol: Real) -> bool {
        Self::tangent_to_dvec(&self.minus(other)).norm() <= tol
    }

    fn to_array(&self) -> Vec<Real> {
        let mut out = vec![0.0; Self::REP_SIZE];
        self.write_array(&mut out);
        out
    }

    /// Parse a flat array, rejecting wrong length, non-finite entries and a
    /// rotation part that is not unit norm.
    fn from_array(values: &[Real]) -> Result<Self, ManifoldError> {
        let norm = check_layout(Self::NAME, Self::REP_SIZE, Self::ROTATION_SIZE, values)?;
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(ManifoldError::NotNormalized {
                manifold: Self::NAME,
                norm,
            });
        }
        Ok(Self::from_unit_slice(values))
    }

    /// Parse a flat array and renormalize the rotation part.
    ///
    /// Only a zero-norm rotation part or non-finite input is rejected.
    fn from_array_normalized(values: &[Real]) -> Result<Self, ManifoldError> {
        let norm = check_layout(Self::NAME, Self::REP_SIZE, Self::ROTATION_SIZE, values)?;
        if norm < Real::EPSILON {
            return Err(ManifoldError::Degenerate {
                manifold: Self::NAME,
                reason: "rotation part has zero norm",
            });
        }
        Ok(Self::from_unit_slice(values))
    }
}

/// Check length and finiteness, returning the norm of the rotation part.
pub(crate) fn check_layout(
    name: &'static str,
    rep_size: usize,
    rotation_size: usize,
    values: &[Real],
) -> Result<Real, ManifoldError> {
    if values.len() != rep_size {
        return Err(ManifoldError::DimensionMismatch {
            manifold: name,
            expected: rep_size,
            actual: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ManifoldError::NonFinite { manifold: name });
    }
    Ok(values[..rotation_size]
        .iter()
        .map(|v| v * v)
        .sum::<Real>()
        .sqrt())
}

/// Group product, right plus and right minus as operators.
macro_rules! impl_group_ops {
    ($group:ty) => {
        impl std::ops::Mul for $group {
            type Output = $group;

            fn mul(self, rhs: $group) -> $group {
                $crate::groups::LieGroup::compose(&self, &rhs)
            }
        }

        impl std::ops::Add<<$group as $crate::groups::LieGroup>::Tangent> for $group {
            type Output = $group;

            fn add(self, delta: <$group as $crate::groups::LieGroup>::Tangent) -> $group {
                $crate::groups::LieGroup::plus(&self, &delta)
            }
        }

        impl std::ops::Sub for $group {
            type Output = <$group as $crate::groups::LieGroup>::Tangent;

            fn sub(self, rhs: $group) -> Self::Output {
                $crate::groups::LieGroup::minus(&self, &rhs)
            }
        }
    };
}

pub(crate) use impl_group_ops;
