use rand::Rng;

use super::{impl_group_ops, LieGroup, So2};
use crate::math::{DMat, DVec, Mat2, Mat3, Real, Vec2, Vec3, SMALL_ANGLE};
use crate::parameterization::ManifoldKind;

/// Planar rigid motion. Flat layout `[cos, sin, tx, ty]`, tangent `[rho_x, rho_y, theta]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Se2 {
    rot: So2,
    t: Vec2,
}

impl Se2 {
    pub fn new(rot: So2, t: Vec2) -> Self {
        Self { rot, t }
    }

    pub fn from_xy_theta(x: Real, y: Real, theta: Real) -> Self {
        Self::new(So2::from_angle(theta), Vec2::new(x, y))
    }

    pub fn rotation(&self) -> &So2 {
        &self.rot
    }

    pub fn translation(&self) -> &Vec2 {
        &self.t
    }

    /// `V(theta)` such that `t = V rho` in the exponential map.
    fn v_matrix(theta: Real) -> Mat2 {
        let (a, b) = if theta.abs() < SMALL_ANGLE {
            (1.0 - theta * theta / 6.0, 0.5 * theta)
        } else {
            (theta.sin() / theta, (1.0 - theta.cos()) / theta)
        };
        Mat2::new(a, -b, b, a)
    }

    fn v_matrix_inv(theta: Real) -> Mat2 {
        let a = if theta.abs() < SMALL_ANGLE {
            1.0 - theta * theta / 12.0
        } else {
            0.5 * theta * theta.sin() / (1.0 - theta.cos())
        };
        let b = 0.5 * theta;
        Mat2::new(a, b, -b, a)
    }

    fn jr_mat(v: &Vec3) -> Mat3 {
        let (rx, ry, theta) = (v.x, v.y, v.z);
        let (a, b, c0, c1) = if theta.abs() < SMALL_ANGLE {
            let t2 = theta * theta;
            (
                1.0 - t2 / 6.0,
                0.5 * theta,
                -0.5 * ry + theta * rx / 6.0,
                0.5 * rx + theta * ry / 6.0,
            )
        } else {
            let (s, c) = theta.sin_cos();
            let t2 = theta * theta;
            (
                s / theta,
                (1.0 - c) / theta,
                (theta * rx - ry + ry * c - rx * s) / t2,
                (rx + theta * ry - rx * c - ry * s) / t2,
            )
        };
        Mat3::new(a, b, c0, -b, a, c1, 0.0, 0.0, 1.0)
    }
}

impl LieGroup for Se2 {
    const NAME: &'static str = "SE2";
    const REP_SIZE: usize = 4;
    const DOF: usize = 3;
    const ROTATION_SIZE: usize = 2;
    const KIND: ManifoldKind = ManifoldKind::SE2;

    type Tangent = Vec3;

    fn identity() -> Self {
        Self::new(So2::identity(), Vec2::zeros())
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let rot = So2::random(rng);
        let t = Vec2::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
        Self::new(rot, t)
    }

    fn compose(&self, other: &Self) -> Self {
        Self::new(self.rot.compose(&other.rot), self.t + self.rot * other.t)
    }

    fn inverse(&self) -> Self {
        let r_inv = self.rot.inverse();
        Self::new(r_inv, -(r_inv * self.t))
    }

    fn exp(v: &Vec3) -> Self {
        let theta = v.z;
        let t = Self::v_matrix(theta) * Vec2::new(v.x, v.y);
        Self::new(So2::from_angle(theta), t)
    }

    fn log(&self) -> Vec3 {
        let theta = self.rot.angle();
        let rho = Self::v_matrix_inv(theta) * self.t;
        Vec3::new(rho.x, rho.y, theta)
    }

    fn adjoint(&self) -> DMat {
        let r = self.rot.rotation_matrix();
        #[rustfmt::skip]
        let ad = DMat::from_row_slice(3, 3, &[
            r[(0, 0)], r[(0, 1)], self.t.y,
            r[(1, 0)], r[(1, 1)], -self.t.x,
            0.0, 0.0, 1.0,
        ]);
        ad
    }

    fn right_jacobian(v: &Vec3) -> DMat {
        let j = Self::jr_mat(v);
        DMat::from_column_slice(3, 3, j.as_slice())
    }

    fn right_jacobian_inv(v: &Vec3) -> DMat {
        let j = Self::jr_mat(v);
        // Jr is invertible for |theta| < 2 pi
        let inv = j.try_inverse().unwrap_or_else(Mat3::identity);
        DMat::from_column_slice(3, 3, inv.as_slice())
    }

    fn plus_jacobian(&self) -> DMat {
        let (c, s) = (self.rot.cos(), self.rot.sin());
        #[rustfmt::skip]
        let j = DMat::from_row_slice(4, 3, &[
            0.0, 0.0, -s,
            0.0, 0.0, c,
            c, -s, 0.0,
            s, c, 0.0,
        ]);
        j
    }

    fn from_unit_slice(values: &[Real]) -> Self {
        Self::new(
            So2::from_complex(values[0], values[1]),
            Vec2::new(values[2], values[3]),
        )
    }

    fn write_array(&self, out: &mut [Real]) {
        self.rot.write_array(&mut out[..2]);
        out[2] = self.t.x;
        out[3] = self.t.y;
    }

    fn tangent_from_slice(v: &[Real]) -> Vec3 {
        Vec3::new(v[0], v[1], v[2])
    }

    fn tangent_to_dvec(v: &Vec3) -> DVec {
        DVec::from_column_slice(v.as_slice())
    }
}

impl_group_ops!(Se2);

impl std::ops::Mul<Vec2> for Se2 {
    type Output = Vec2;

    fn mul(self, p: Vec2) -> Vec2 {
        self.rot * p + self.t
    }
}
