use liefactor_core::{DMat, DVec, LieGroup, Real, Se3, So3};

use super::{group_from, BlockSpec, Factor};
use crate::error::{ConfigurationError, FactorError};
use crate::noise::SqrtInformation;

/// Calibration offset between a sensor frame and a reference frame.
///
/// Given a measured pose `T` and a reference pose `T_ref = T · T_off`, the error on
/// the offset block is `e = Log(T_off⁻¹ · T⁻¹ · T_ref)` with Jacobian
/// `-Jr⁻¹(e) · Ad(Exp(e)⁻¹)`.
#[derive(Debug, Clone)]
pub struct OffsetFactor<G: LieGroup> {
    /// `T⁻¹ · T_ref`, the offset implied by the measurements.
    implied: G,
    noise: SqrtInformation,
}

pub type So3OffsetFactor = OffsetFactor<So3>;
pub type Se3OffsetFactor = OffsetFactor<Se3>;

impl<G: LieGroup> OffsetFactor<G> {
    pub fn new(
        reference: G,
        measured: G,
        noise: SqrtInformation,
    ) -> Result<Self, ConfigurationError> {
        noise.check_dim(G::DOF)?;
        Ok(Self {
            implied: measured.inverse().compose(&reference),
            noise,
        })
    }

    pub fn from_arrays(
        reference: &[Real],
        measured: &[Real],
        information: &DMat,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            G::from_array(reference)?,
            G::from_array(measured)?,
            SqrtInformation::from_information(information)?,
        )
    }

    pub fn implied_offset(&self) -> &G {
        &self.implied
    }
}

impl<G: LieGroup> Factor for OffsetFactor<G> {
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
        let offset = group_from::<G>(params[0])?;
        let residual_pose = offset.inverse().compose(&self.implied);
        let e = residual_pose.log();
        if let Some(jac) = jacobians {
            let j = -(G::right_jacobian_inv(&e) * residual_pose.inverse().adjoint());
            jac[0] = self.noise.whiten_jacobian(&j);
        }
        Ok(self.noise.whiten(&G::tangent_to_dvec(&e)))
    }
}
