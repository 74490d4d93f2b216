use nalgebra::{
    DMatrix, DVector, Matrix2, Matrix3, Matrix4, UnitComplex, UnitQuaternion, Vector1, Vector2,
    Vector3, Vector4, Vector6,
};

pub type Real = f64;

pub type Vec1 = Vector1<Real>;
pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Vec4 = Vector4<Real>;
pub type Vec6 = Vector6<Real>;
pub type Mat2 = Matrix2<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat4 = Matrix4<Real>;
pub type DMat = DMatrix<Real>;
pub type DVec = DVector<Real>;
pub type UnitQuat = UnitQuaternion<Real>;
pub type UnitCplx = UnitComplex<Real>;

/// Below this angle the closed-form Lie group expressions switch to Taylor series.
pub const SMALL_ANGLE: Real = 1e-6;

/// Tolerance on `| |x| - 1 |` when a rotation part is checked for unit norm.
pub const NORM_TOLERANCE: Real = 1e-6;

/// Skew-symmetric matrix `[v]x` such that `[v]x w = v x w`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// 2D cross product matrix `[[0, -1], [1, 0]]` scaled by `w`.
pub fn skew2(w: Real) -> Mat2 {
    Mat2::new(0.0, -w, w, 0.0)
}

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle(theta: Real) -> Real {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut a = theta % two_pi;
    if a <= -std::f64::consts::PI {
        a += two_pi;
    } else if a > std::f64::consts::PI {
        a -= two_pi;
    }
    a
}
