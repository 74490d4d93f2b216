use liefactor_core::{DMat, DVec, LieGroup, Real, So3, Vec3};

use super::{BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};
use crate::noise::SqrtInformation;

/// Time offset between an attitude source and a reference attitude.
///
/// The attitude `q` was observed `dt` seconds after `q_ref` while rotating with
/// body rate `omega`: `q ≈ q_ref · Exp(-dt · omega)`. The single parameter block
/// is the scalar `dt`.
#[derive(Debug, Clone)]
pub struct TimeSyncAttFactor {
    q_ref: So3,
    q: So3,
    omega: Vec3,
    noise: SqrtInformation,
}

impl TimeSyncAttFactor {
    pub fn new(
        q_ref: So3,
        q: So3,
        omega: Vec3,
        noise: SqrtInformation,
    ) -> Result<Self, ConfigurationError> {
        noise.check_dim(So3::DOF)?;
        if omega.iter().any(|w| !w.is_finite()) {
            return Err(ConfigurationError::InvalidNoise(
                "angular rate must be finite".to_string(),
            ));
        }
        Ok(Self {
            q_ref,
            q,
            omega,
            noise,
        })
    }

    pub fn from_arrays(
        q_ref: &[Real],
        q: &[Real],
        omega: [Real; 3],
        information: &DMat,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            So3::from_array(q_ref)?,
            So3::from_array(q)?,
            Vec3::from(omega),
            SqrtInformation::from_information(information)?,
        )
    }
}

impl Factor for TimeSyncAttFactor {
    fn residual_dim(&self) -> usize {
        So3::DOF
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::euclidean(1)]
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let dt = params[0][0];
        let predicted = self.q_ref.plus(&(self.omega * -dt));
        let e = predicted.inverse().compose(&self.q).log();
        if let Some(jac) = jacobians {
            let de_ddt = So3::jl_inv(&e) * self.omega;
            let j = DMat::from_column_slice(3, 1, de_ddt.as_slice());
            jac[0] = self.noise.whiten_jacobian(&j);
        }
        Ok(self.noise.whiten(&So3::tangent_to_dvec(&e)))
    }
}
