use nalgebra::Complex;
use rand::Rng;

use super::{impl_group_ops, LieGroup};
use crate::math::{DMat, DVec, Mat2, Real, UnitCplx, Vec1, Vec2};
use crate::parameterization::ManifoldKind;

/// Planar rotation stored as a unit complex number `[cos, sin]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct So2(UnitCplx);

impl So2 {
    pub fn from_angle(theta: Real) -> Self {
        Self(UnitCplx::new(theta))
    }

    /// Rotation angle in `(-pi, pi]`.
    pub fn angle(&self) -> Real {
        self.0.angle()
    }

    pub fn cos(&self) -> Real {
        self.0.cos_angle()
    }

    pub fn sin(&self) -> Real {
        self.0.sin_angle()
    }

    /// Build from a complex number, normalizing it.
    pub fn from_complex(re: Real, im: Real) -> Self {
        Self(UnitCplx::new_normalize(Complex::new(re, im)))
    }

    /// Rotation that maps direction `a` onto direction `b`.
    pub fn from_two_unit_vectors(a: &Vec2, b: &Vec2) -> Self {
        Self(UnitCplx::rotation_between(a, b))
    }

    pub fn unit_complex(&self) -> &UnitCplx {
        &self.0
    }

    pub fn rotation_matrix(&self) -> Mat2 {
        let (c, s) = (self.cos(), self.sin());
        Mat2::new(c, -s, s, c)
    }
}

impl LieGroup for So2 {
    const NAME: &'static str = "SO2";
    const REP_SIZE: usize = 2;
    const DOF: usize = 1;
    const ROTATION_SIZE: usize = 2;
    const KIND: ManifoldKind = ManifoldKind::SO2;

    type Tangent = Vec1;

    fn identity() -> Self {
        Self(UnitCplx::identity())
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let theta = rng.random_range(-std::f64::consts::PI..std::f64::consts::PI);
        Self::from_angle(theta)
    }

    fn compose(&self, other: &Self) -> Self {
        Self(self.0 * other.0)
    }

    fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    fn exp(v: &Vec1) -> Self {
        Self::from_angle(v[0])
    }

    fn log(&self) -> Vec1 {
        Vec1::new(self.angle())
    }

    fn adjoint(&self) -> DMat {
        DMat::identity(1, 1)
    }

    fn right_jacobian(_v: &Vec1) -> DMat {
        DMat::identity(1, 1)
    }

    fn right_jacobian_inv(_v: &Vec1) -> DMat {
        DMat::identity(1, 1)
    }

    fn plus_jacobian(&self) -> DMat {
        DMat::from_column_slice(2, 1, &[-self.sin(), self.cos()])
    }

    fn from_unit_slice(values: &[Real]) -> Self {
        Self::from_complex(values[0], values[1])
    }

    fn write_array(&self, out: &mut [Real]) {
        out[0] = self.cos();
        out[1] = self.sin();
    }

    fn tangent_from_slice(v: &[Real]) -> Vec1 {
        Vec1::new(v[0])
    }

    fn tangent_to_dvec(v: &Vec1) -> DVec {
        DVec::from_column_slice(v.as_slice())
    }
}

impl_group_ops!(So2);

impl std::ops::Mul<Vec2> for So2 {
    type Output = Vec2;

    fn mul(self, p: Vec2) -> Vec2 {
        self.0 * p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn angle_composition_wraps() {
        let a = So2::from_angle(0.75 * PI);
        let b = So2::from_angle(0.5 * PI);
        let c = a * b;
        assert!((c.angle() + 0.75 * PI).abs() < 1e-12, "angle {}", c.angle());
    }

    #[test]
    fn two_unit_vectors() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(0.0, 1.0);
        let r = So2::from_two_unit_vectors(&a, &b);
        assert!((r.angle() - 0.5 * PI).abs() < 1e-12);
        assert!((r * a - b).norm() < 1e-12);
    }

    #[test]
    fn minus_is_shortest_angle() {
        let a = So2::from_angle(PI - 0.1);
        let b = So2::from_angle(-PI + 0.1);
        let d = a - b;
        assert!((d[0] + 0.2).abs() < 1e-12, "delta {}", d[0]);
    }
}
