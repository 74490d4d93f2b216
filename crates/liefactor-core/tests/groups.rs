use liefactor_core::test_utils::{fd_tangent_jacobian, seeded_rng};
use liefactor_core::{LieGroup, ManifoldKind, Se2, Se3, So2, So3, Vec2, Vec3, Vec6};

#[test]
fn lplus_equals_conjugated_rplus() {
    let mut rng = seeded_rng(17);
    let x = Se3::random(&mut rng);
    let d = Vec6::new(0.1, -0.2, 0.05, 0.02, 0.03, -0.01);
    let left = x.lplus(&d);
    // Exp(d) · X = X · Exp(Ad(X⁻¹) d)
    let ad_inv_d = x.inverse().adjoint() * Se3::tangent_to_dvec(&d);
    let right = x.plus(&Se3::tangent_from_slice(ad_inv_d.as_slice()));
    assert!(left.is_approx(&right, 1e-10));
}

#[test]
fn log_of_minus_has_right_jacobian_inverse() {
    // d/dδ Log(m⁻¹ · X · Exp(δ)) = Jr⁻¹(Log(m⁻¹ X))
    let mut rng = seeded_rng(23);
    let m = So3::random(&mut rng);
    let x = m.plus(&Vec3::new(0.3, -0.4, 0.2));
    let numeric = fd_tangent_jacobian(&x, 1e-6, |g| {
        m.inverse().compose(g).log().as_slice().to_vec()
    });
    let e = x.minus(&m);
    let analytic = So3::right_jacobian_inv(&e);
    let diff = (numeric - analytic).abs().max();
    assert!(diff < 1e-6, "jacobian mismatch {diff}");
}

#[test]
fn se2_point_action_composes() {
    let a = Se2::from_xy_theta(1.0, 2.0, 0.3);
    let b = Se2::from_xy_theta(-0.5, 0.4, -1.1);
    let p = Vec2::new(0.7, -0.2);
    let lhs = (a * b) * p;
    let rhs = a * (b * p);
    assert!((lhs - rhs).norm() < 1e-12);
}

#[test]
fn so2_operators() {
    let a = So2::from_angle(0.4);
    let b = a + liefactor_core::Vec1::new(0.2);
    assert!((b.angle() - 0.6).abs() < 1e-12);
    assert!(((b - a)[0] - 0.2).abs() < 1e-12);
}

#[test]
fn manifold_kind_serde_and_dims() {
    let json = serde_json::to_string(&ManifoldKind::SE3).unwrap();
    assert_eq!(json, "\"SE3\"");
    let back: ManifoldKind = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ManifoldKind::SE3);
    assert!(ManifoldKind::SO3.compatible_dim(4));
    assert!(!ManifoldKind::SO3.compatible_dim(3));
    assert_eq!(ManifoldKind::SE2.tangent_dim(4), 3);
    assert_eq!(ManifoldKind::Euclidean.tangent_dim(5), 5);
}
