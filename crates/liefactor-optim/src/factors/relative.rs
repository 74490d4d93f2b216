use liefactor_core::{DMat, DVec, LieGroup, Real, Se2, Se3, So3};

use super::{group_from, BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};
use crate::noise::SqrtInformation;

/// Relative measurement `T_ij` between two group elements `T0` and `T1`.
///
/// Error `e = Log(T_ij⁻¹ · T0⁻¹ · T1)`. With `M = T0⁻¹ · T1`, the Jacobians are
/// `-Jr⁻¹(e) · Ad(M⁻¹)` for `T0` and `Jr⁻¹(e)` for `T1`.
#[derive(Debug, Clone)]
pub struct RelativeFactor<G: LieGroup> {
    measured: G,
    noise: SqrtInformation,
}

pub type RelSo3Factor = RelativeFactor<So3>;
pub type RelSe2Factor = RelativeFactor<Se2>;
pub type RelSe3Factor = RelativeFactor<Se3>;

impl<G: LieGroup> RelativeFactor<G> {
    pub fn new(measured: G, noise: SqrtInformation) -> Result<Self, ConfigurationError> {
        noise.check_dim(G::DOF)?;
        Ok(Self { measured, noise })
    }

    pub fn from_array(measured: &[Real], information: &DMat) -> Result<Self, ConfigurationError> {
        Self::new(
            G::from_array(measured)?,
            SqrtInformation::from_information(information)?,
        )
    }

    pub fn measured(&self) -> &G {
        &self.measured
    }
}

impl<G: LieGroup> Factor for RelativeFactor<G> {
    fn residual_dim(&self) -> usize {
        G::DOF
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::of::<G>(), BlockSpec::of::<G>()]
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let t0 = group_from::<G>(params[0])?;
        let t1 = group_from::<G>(params[1])?;
        let m = t0.inverse().compose(&t1);
        let e = self.measured.inverse().compose(&m).log();
        if let Some(jac) = jacobians {
            let jr_inv = G::right_jacobian_inv(&e);
            let j0 = -(&jr_inv * m.inverse().adjoint());
            jac[0] = self.noise.whiten_jacobian(&j0);
            jac[1] = self.noise.whiten_jacobian(&jr_inv);
        }
        Ok(self.noise.whiten(&G::tangent_to_dvec(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liefactor_core::test_utils::{fd_tangent_jacobian, seeded_rng};

    fn check_relative_jacobians<G: LieGroup>() {
        let mut rng = seeded_rng(202);
        let t0 = G::random(&mut rng);
        let t1 = G::random(&mut rng);
        let measured = t0
            .inverse()
            .compose(&t1)
            .plus(&(G::random(&mut rng).log() * 0.3));
        let f = RelativeFactor::<G>::new(measured, SqrtInformation::identity(G::DOF)).unwrap();

        let a = t0.to_array();
        let b = t1.to_array();
        let mut jac = vec![DMat::zeros(G::DOF, G::DOF), DMat::zeros(G::DOF, G::DOF)];
        f.evaluate(&[a.as_slice(), b.as_slice()], Some(jac.as_mut_slice()))
            .unwrap();

        let num0 = fd_tangent_jacobian(&t0, 1e-6, |g| {
            let v = g.to_array();
            f.evaluate(&[v.as_slice(), b.as_slice()], None)
                .unwrap()
                .as_slice()
                .to_vec()
        });
        let num1 = fd_tangent_jacobian(&t1, 1e-6, |g| {
            let v = g.to_array();
            f.evaluate(&[a.as_slice(), v.as_slice()], None)
                .unwrap()
                .as_slice()
                .to_vec()
        });
        let d0 = (num0 - &jac[0]).amax();
        let d1 = (num1 - &jac[1]).amax();
        assert!(d0 < 1e-5, "{}: d/dT0 off by {}", G::NAME, d0);
        assert!(d1 < 1e-5, "{}: d/dT1 off by {}", G::NAME, d1);
    }

    #[test]
    fn relative_jacobians_match_finite_differences() {
        check_relative_jacobians::<So3>();
        check_relative_jacobians::<Se2>();
        check_relative_jacobians::<Se3>();
    }
}
