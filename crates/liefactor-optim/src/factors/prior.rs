use liefactor_core::{DMat, DVec, LieGroup, Real, Se2, Se3, So2, So3};

use super::{group_from, BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};
use crate::noise::SqrtInformation;

/// Absolute measurement of a group element.
///
/// Error `e = Log(measured⁻¹ · X)`, Jacobian `Jr⁻¹(e)`.
#[derive(Debug, Clone)]
pub struct PriorFactor<G: LieGroup> {
    measured: G,
    noise: SqrtInformation,
}

pub type So2Factor = PriorFactor<So2>;
pub type So3Factor = PriorFactor<So3>;
pub type Se2Factor = PriorFactor<Se2>;
pub type Se3Factor = PriorFactor<Se3>;

impl<G: LieGroup> PriorFactor<G> {
    pub fn new(measured: G, noise: SqrtInformation) -> Result<Self, ConfigurationError> {
        noise.check_dim(G::DOF)?;
        Ok(Self { measured, noise })
    }

    /// Build from a flat measurement and an information matrix, as stored in files.
    pub fn from_array(measured: &[Real], information: &DMat) -> Result<Self, ConfigurationError> {
        Self::new(
            G::from_array(measured)?,
            SqrtInformation::from_information(information)?,
        )
    }

    pub fn measured(&self) -> &G {
        &self.measured
    }

    pub(crate) fn error(&self, x: &G) -> G::Tangent {
        self.measured.inverse().compose(x).log()
    }
}

impl<G: LieGroup> Factor for PriorFactor<G> {
    fn residual_dim(&self) -> usize {
        G::DOF
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::of::<G>()]
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let x = group_from::<G>(params[0])?;
        let e = self.error(&x);
        if let Some(jac) = jacobians {
            jac[0] = self
                .noise
                .whiten_jacobian(&G::right_jacobian_inv(&e));
        }
        Ok(self.noise.whiten(&G::tangent_to_dvec(&e)))
    }
}
