use nalgebra::Matrix6;
use rand::Rng;

use super::{impl_group_ops, LieGroup, So3};
use crate::math::{skew, DMat, DVec, Mat3, Real, Vec3, Vec6, SMALL_ANGLE};
use crate::parameterization::ManifoldKind;

type Mat6 = Matrix6<Real>;

/// Rigid motion in 3D.
///
/// Flat layout `[qw, qx, qy, qz, tx, ty, tz]`; tangent `[rho; theta]` with the
/// translational part first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Se3 {
    rot: So3,
    t: Vec3,
}

impl Se3 {
    pub fn new(rot: So3, t: Vec3) -> Self {
        Self { rot, t }
    }

    pub fn rotation(&self) -> &So3 {
        &self.rot
    }

    pub fn translation(&self) -> &Vec3 {
        &self.t
    }

    /// Homogeneous 4x4 matrix.
    pub fn matrix(&self) -> crate::math::Mat4 {
        let mut m = crate::math::Mat4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rot.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.t);
        m
    }

    /// Off-diagonal block of the SE(3) left Jacobian (Barfoot's `Q`).
    fn q_block(rho: &Vec3, phi: &Vec3) -> Mat3 {
        let theta2 = phi.norm_squared();
        let theta = theta2.sqrt();
        let (c1, c2, c3) = if theta < SMALL_ANGLE {
            (1.0 / 6.0, 1.0 / 24.0, 1.0 / 120.0)
        } else {
            let (s, c) = theta.sin_cos();
            let t3 = theta2 * theta;
            (
                (theta - s) / t3,
                (theta2 + 2.0 * c - 2.0) / (2.0 * theta2 * theta2),
                (2.0 * theta - 3.0 * s + theta * c) / (2.0 * theta2 * t3),
            )
        };
        let p = skew(phi);
        let r = skew(rho);
        let pr = p * r;
        let rp = r * p;
        let prp = pr * p;
        r * 0.5
            + (pr + rp + prp) * c1
            + (p * pr + rp * p - prp * 3.0) * c2
            + (prp * p + p * prp) * c3
    }

    fn left_jacobian_mat(v: &Vec6) -> Mat6 {
        let rho = Vec3::new(v[0], v[1], v[2]);
        let phi = Vec3::new(v[3], v[4], v[5]);
        let jl = So3::jl(&phi);
        let mut out = Mat6::zeros();
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&jl);
        out.fixed_view_mut::<3, 3>(3, 3).copy_from(&jl);
        out.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&Self::q_block(&rho, &phi));
        out
    }

    fn left_jacobian_inv_mat(v: &Vec6) -> Mat6 {
        let rho = Vec3::new(v[0], v[1], v[2]);
        let phi = Vec3::new(v[3], v[4], v[5]);
        let jl_inv = So3::jl_inv(&phi);
        let q = Self::q_block(&rho, &phi);
        let mut out = Mat6::zeros();
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&jl_inv);
        out.fixed_view_mut::<3, 3>(3, 3).copy_from(&jl_inv);
        out.fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-jl_inv * q * jl_inv));
        out
    }
}

impl LieGroup for Se3 {
    const NAME: &'static str = "SE3";
    const REP_SIZE: usize = 7;
    const DOF: usize = 6;
    const ROTATION_SIZE: usize = 4;
    const KIND: ManifoldKind = ManifoldKind::SE3;

    type Tangent = Vec6;

    fn identity() -> Self {
        Self::new(So3::identity(), Vec3::zeros())
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let rot = So3::random(rng);
        let t = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        Self::new(rot, t)
    }

    fn compose(&self, other: &Self) -> Self {
        Self::new(self.rot.compose(&other.rot), self.t + self.rot * other.t)
    }

    fn inverse(&self) -> Self {
        let r_inv = self.rot.inverse();
        Self::new(r_inv, -(r_inv * self.t))
    }

    fn exp(v: &Vec6) -> Self {
        let rho = Vec3::new(v[0], v[1], v[2]);
        let phi = Vec3::new(v[3], v[4], v[5]);
        Self::new(So3::exp(&phi), So3::jl(&phi) * rho)
    }

    fn log(&self) -> Vec6 {
        let phi = self.rot.log();
        let rho = So3::jl_inv(&phi) * self.t;
        Vec6::new(rho.x, rho.y, rho.z, phi.x, phi.y, phi.z)
    }

    fn adjoint(&self) -> DMat {
        let r = self.rot.rotation_matrix();
        let mut ad = DMat::zeros(6, 6);
        ad.view_mut((0, 0), (3, 3)).copy_from(&r);
        ad.view_mut((3, 3), (3, 3)).copy_from(&r);
        ad.view_mut((0, 3), (3, 3)).copy_from(&(skew(&self.t) * r));
        ad
    }

    fn right_jacobian(v: &Vec6) -> DMat {
        let j = Self::left_jacobian_mat(&-v);
        DMat::from_column_slice(6, 6, j.as_slice())
    }

    fn right_jacobian_inv(v: &Vec6) -> DMat {
        let j = Self::left_jacobian_inv_mat(&-v);
        DMat::from_column_slice(6, 6, j.as_slice())
    }

    fn plus_jacobian(&self) -> DMat {
        let mut j = DMat::zeros(7, 6);
        j.view_mut((0, 3), (4, 3))
            .copy_from(&self.rot.plus_jacobian());
        j.view_mut((4, 0), (3, 3))
            .copy_from(&self.rot.rotation_matrix());
        j
    }

    fn from_unit_slice(values: &[Real]) -> Self {
        Self::new(
            So3::from_wxyz(values[0], values[1], values[2], values[3]),
            Vec3::new(values[4], values[5], values[6]),
        )
    }

    fn write_array(&self, out: &mut [Real]) {
        self.rot.write_array(&mut out[..4]);
        out[4] = self.t.x;
        out[5] = self.t.y;
        out[6] = self.t.z;
    }

    fn tangent_from_slice(v: &[Real]) -> Vec6 {
        Vec6::from_column_slice(&v[..6])
    }

    fn tangent_to_dvec(v: &Vec6) -> DVec {
        DVec::from_column_slice(v.as_slice())
    }
}

impl_group_ops!(Se3);

impl std::ops::Mul<Vec3> for Se3 {
    type Output = Vec3;

    fn mul(self, p: Vec3) -> Vec3 {
        self.rot * p + self.t
    }
}
