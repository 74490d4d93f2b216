//! Helpers shared by the workspace test suites.
//!
//! Public so integration tests in other crates can use them; not intended for
//! production use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::groups::LieGroup;
use crate::math::{DMat, Real};

/// Deterministic RNG for reproducible tests.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Standard normal sample via Box-Muller.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> Real {
    let u1: Real = rng.random::<Real>().max(1e-300);
    let u2: Real = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Vector of independent zero-mean Gaussian samples with standard deviation `sigma`.
pub fn gaussian_vec<R: Rng + ?Sized>(rng: &mut R, n: usize, sigma: Real) -> Vec<Real> {
    (0..n).map(|_| sigma * gaussian(rng)).collect()
}

pub fn assert_slices_close(actual: &[Real], expected: &[Real], tol: Real) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "index {}: {} vs {} (tol={})",
            i,
            a,
            e,
            tol
        );
    }
}

/// Central-difference Jacobian of the flat layout of `x · Exp(δ)` at `δ = 0`.
pub fn fd_plus_jacobian<G: LieGroup>(x: &G, h: Real) -> DMat {
    let mut jac = DMat::zeros(G::REP_SIZE, G::DOF);
    for k in 0..G::DOF {
        let mut d = vec![0.0; G::DOF];
        d[k] = h;
        let plus = x.plus(&G::tangent_from_slice(&d)).to_array();
        d[k] = -h;
        let minus = x.plus(&G::tangent_from_slice(&d)).to_array();
        for i in 0..G::REP_SIZE {
            jac[(i, k)] = (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    jac
}

/// Central-difference Jacobian of `f` with respect to a right tangent perturbation of `x`.
pub fn fd_tangent_jacobian<G, F>(x: &G, h: Real, f: F) -> DMat
where
    G: LieGroup,
    F: Fn(&G) -> Vec<Real>,
{
    let rows = f(x).len();
    let mut jac = DMat::zeros(rows, G::DOF);
    for k in 0..G::DOF {
        let mut d = vec![0.0; G::DOF];
        d[k] = h;
        let fp = f(&x.plus(&G::tangent_from_slice(&d)));
        d[k] = -h;
        let fm = f(&x.plus(&G::tangent_from_slice(&d)));
        for i in 0..rows {
            jac[(i, k)] = (fp[i] - fm[i]) / (2.0 * h);
        }
    }
    jac
}
