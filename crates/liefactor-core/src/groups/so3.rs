use nalgebra::{Quaternion, Rotation3};
use rand::Rng;

use super::{impl_group_ops, LieGroup};
use crate::math::{skew, DMat, DVec, Mat3, Real, UnitQuat, Vec3, SMALL_ANGLE};
use crate::parameterization::ManifoldKind;

/// 3D rotation stored as a unit quaternion `[qw, qx, qy, qz]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct So3(UnitQuat);

impl So3 {
    pub fn from_quaternion(q: UnitQuat) -> Self {
        Self(q)
    }

    /// Build from quaternion components, normalizing.
    pub fn from_wxyz(w: Real, x: Real, y: Real, z: Real) -> Self {
        Self(UnitQuat::new_normalize(Quaternion::new(w, x, y, z)))
    }

    pub fn from_rotation_matrix(m: &Mat3) -> Self {
        Self(UnitQuat::from_rotation_matrix(
            &Rotation3::from_matrix_unchecked(*m),
        ))
    }

    pub fn quaternion(&self) -> &UnitQuat {
        &self.0
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        self.0.to_rotation_matrix().into_inner()
    }

    /// Rotation angle in `[0, pi]`.
    pub fn angle(&self) -> Real {
        self.log().norm()
    }

    /// Left Jacobian of the SO(3) exponential.
    pub fn jl(phi: &Vec3) -> Mat3 {
        Self::jr(&-phi)
    }

    /// Right Jacobian of the SO(3) exponential.
    pub fn jr(phi: &Vec3) -> Mat3 {
        let theta2 = phi.norm_squared();
        let k = skew(phi);
        let (a, b) = if theta2.sqrt() < SMALL_ANGLE {
            (0.5 - theta2 / 24.0, 1.0 / 6.0 - theta2 / 120.0)
        } else {
            let theta = theta2.sqrt();
            (
                (1.0 - theta.cos()) / theta2,
                (theta - theta.sin()) / (theta2 * theta),
            )
        };
        Mat3::identity() - k * a + k * k * b
    }

    pub fn jr_inv(phi: &Vec3) -> Mat3 {
        let theta2 = phi.norm_squared();
        let k = skew(phi);
        let c = if theta2.sqrt() < SMALL_ANGLE {
            1.0 / 12.0 + theta2 / 720.0
        } else {
            let theta = theta2.sqrt();
            1.0 / theta2 - (1.0 + theta.cos()) / (2.0 * theta * theta.sin())
        };
        Mat3::identity() + k * 0.5 + k * k * c
    }

    pub fn jl_inv(phi: &Vec3) -> Mat3 {
        Self::jr_inv(&-phi)
    }

    pub(crate) fn exp_vec(phi: &Vec3) -> Self {
        let theta2 = phi.norm_squared();
        let theta = theta2.sqrt();
        let (w, k) = if theta < SMALL_ANGLE {
            (1.0 - theta2 / 8.0, 0.5 - theta2 / 48.0)
        } else {
            ((0.5 * theta).cos(), (0.5 * theta).sin() / theta)
        };
        Self::from_wxyz(w, k * phi.x, k * phi.y, k * phi.z)
    }

    pub(crate) fn log_vec(&self) -> Vec3 {
        let q = self.0.quaternion();
        let (w, v) = if q.w < 0.0 {
            (-q.w, -q.imag())
        } else {
            (q.w, q.imag())
        };
        let n = v.norm();
        if n < SMALL_ANGLE {
            // atan2(n, w) / n ≈ (1 - n²/(3w²)) / w
            v * (2.0 / w * (1.0 - n * n / (3.0 * w * w)))
        } else {
            v * (2.0 * n.atan2(w) / n)
        }
    }
}

impl LieGroup for So3 {
    const NAME: &'static str = "SO3";
    const REP_SIZE: usize = 4;
    const DOF: usize = 3;
    const ROTATION_SIZE: usize = 4;
    const KIND: ManifoldKind = ManifoldKind::SO3;

    type Tangent = Vec3;

    fn identity() -> Self {
        Self(UnitQuat::identity())
    }

    /// Uniform sampling (Shoemake).
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let two_pi = 2.0 * std::f64::consts::PI;
        let u1: Real = rng.random();
        let u2: Real = rng.random();
        let u3: Real = rng.random();
        let a = (1.0 - u1).sqrt();
        let b = u1.sqrt();
        Self::from_wxyz(
            b * (two_pi * u3).cos(),
            a * (two_pi * u2).sin(),
            a * (two_pi * u2).cos(),
            b * (two_pi * u3).sin(),
        )
    }

    fn compose(&self, other: &Self) -> Self {
        // renormalize so long chains of products stay on the manifold
        Self(UnitQuat::new_normalize(
            self.0.into_inner() * other.0.into_inner(),
        ))
    }

    fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    fn exp(v: &Vec3) -> Self {
        Self::exp_vec(v)
    }

    fn log(&self) -> Vec3 {
        self.log_vec()
    }

    fn adjoint(&self) -> DMat {
        let r = self.rotation_matrix();
        DMat::from_column_slice(3, 3, r.as_slice())
    }

    fn right_jacobian(v: &Vec3) -> DMat {
        let j = Self::jr(v);
        DMat::from_column_slice(3, 3, j.as_slice())
    }

    fn right_jacobian_inv(v: &Vec3) -> DMat {
        let j = Self::jr_inv(v);
        DMat::from_column_slice(3, 3, j.as_slice())
    }

    fn plus_jacobian(&self) -> DMat {
        let q = self.0.quaternion();
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);
        DMat::from_row_slice(
            4,
            3,
            &[
                -x, -y, -z, //
                w, -z, y, //
                z, w, -x, //
                -y, x, w,
            ],
        ) * 0.5
    }

    fn from_unit_slice(values: &[Real]) -> Self {
        Self::from_wxyz(values[0], values[1], values[2], values[3])
    }

    fn write_array(&self, out: &mut [Real]) {
        let q = self.0.quaternion();
        out[0] = q.w;
        out[1] = q.i;
        out[2] = q.j;
        out[3] = q.k;
    }

    fn tangent_from_slice(v: &[Real]) -> Vec3 {
        Vec3::new(v[0], v[1], v[2])
    }

    fn tangent_to_dvec(v: &Vec3) -> DVec {
        DVec::from_column_slice(v.as_slice())
    }
}

impl_group_ops!(So3);

impl std::ops::Mul<Vec3> for So3 {
    type Output = Vec3;

    fn mul(self, p: Vec3) -> Vec3 {
        self.0 * p
    }
}
