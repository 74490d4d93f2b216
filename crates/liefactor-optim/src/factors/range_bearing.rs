use liefactor_core::{wrap_angle, DMat, DVec, ManifoldKind, Mat2, Real, Vec2};

use super::{BlockSpec, Factor, JacobianFrame};
use crate::error::{ConfigurationError, FactorError};

/// Range and bearing to a 2D landmark from a known sensor pose, with an unknown
/// heading bias.
///
/// Parameter blocks: the landmark position `l` (Euclidean, 2) and the heading
/// error `R_err` (SO2, `[cos, sin]`). The sensor at `position` with heading
/// `heading` measures range `|l - p|` and bearing `atan2(u) - angle(R_err)` where
/// `u = R(heading)⁻¹ (l - p)`.
///
/// Jacobians are reported with respect to the flat block values.
#[derive(Debug, Clone)]
pub struct RangeBearing2DFactor {
    range: Real,
    sigma_range: Real,
    bearing: Real,
    sigma_bearing: Real,
    position: Vec2,
    heading: Real,
}

impl RangeBearing2DFactor {
    pub fn new(
        range: Real,
        sigma_range: Real,
        bearing: Real,
        sigma_bearing: Real,
        position: Vec2,
        heading: Real,
    ) -> Result<Self, ConfigurationError> {
        for (name, sigma) in [("range", sigma_range), ("bearing", sigma_bearing)] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(ConfigurationError::InvalidNoise(format!(
                    "{name} standard deviation must be positive, got {sigma}"
                )));
            }
        }
        Ok(Self {
            range,
            sigma_range,
            bearing,
            sigma_bearing,
            position,
            heading,
        })
    }
}

impl Factor for RangeBearing2DFactor {
    fn residual_dim(&self) -> usize {
        2
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::euclidean(2), BlockSpec::new(ManifoldKind::SO2, 2)]
    }

    fn jacobian_frame(&self) -> JacobianFrame {
        JacobianFrame::Ambient
    }

    fn evaluate(
        &self,
        params: &[&[Real]],
        jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        let l = Vec2::new(params[0][0], params[0][1]);
        let (c, s) = (params[1][0], params[1][1]);
        let cs2 = c * c + s * s;
        if !(cs2 > 0.0) {
            return Err(FactorError::Evaluation(
                "heading error block has zero norm".to_string(),
            ));
        }

        let delta = l - self.position;
        let dist = delta.norm();
        if dist < Real::EPSILON {
            return Err(FactorError::Evaluation(
                "landmark coincides with the sensor position".to_string(),
            ));
        }
        let (sh, ch) = self.heading.sin_cos();
        let rot_t = Mat2::new(ch, sh, -sh, ch);
        let u = rot_t * delta;

        let predicted = u.y.atan2(u.x) - s.atan2(c);
        let residual = DVec::from_column_slice(&[
            (dist - self.range) / self.sigma_range,
            wrap_angle(predicted - self.bearing) / self.sigma_bearing,
        ]);

        if let Some(jac) = jacobians {
            let dr_dl = delta.transpose() / (dist * self.sigma_range);
            let dpsi_du = Vec2::new(-u.y, u.x).transpose() / u.norm_squared();
            let db_dl = dpsi_du * rot_t / self.sigma_bearing;
            jac[0] = DMat::from_row_slice(2, 2, &[dr_dl[0], dr_dl[1], db_dl[0], db_dl[1]]);
            let k = 1.0 / (cs2 * self.sigma_bearing);
            jac[1] = DMat::from_row_slice(2, 2, &[0.0, 0.0, s * k, -c * k]);
        }
        Ok(residual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor() -> RangeBearing2DFactor {
        RangeBearing2DFactor::new(5.0, 0.1, 0.3, 0.05, Vec2::new(1.0, -2.0), 0.7).unwrap()
    }

    #[test]
    fn ambient_jacobian_matches_finite_differences() {
        let f = factor();
        let l = [4.0, 1.5];
        let r = [0.2f64.cos(), 0.2f64.sin()];
        let mut jac = vec![DMat::zeros(2, 2), DMat::zeros(2, 2)];
        f.evaluate(&[&l[..], &r[..]], Some(jac.as_mut_slice()))
            .unwrap();

        let h = 1e-6;
        for block in 0..2 {
            for k in 0..2 {
                let mut p = [l, r];
                let mut m = [l, r];
                p[block][k] += h;
                m[block][k] -= h;
                let fp = f.evaluate(&[&p[0][..], &p[1][..]], None).unwrap();
                let fm = f.evaluate(&[&m[0][..], &m[1][..]], None).unwrap();
                let fd = (fp - fm) / (2.0 * h);
                for i in 0..2 {
                    assert!(
                        (fd[i] - jac[block][(i, k)]).abs() < 1e-5,
                        "block {block} ({i}, {k}): fd {} vs {}",
                        fd[i],
                        jac[block][(i, k)]
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_landmark_at_sensor() {
        let f = factor();
        let err = f
            .evaluate(&[&[1.0, -2.0][..], &[1.0, 0.0][..]], None)
            .unwrap_err();
        assert!(matches!(err, FactorError::Evaluation(_)));
    }

    #[test]
    fn rejects_non_positive_sigma() {
        assert!(RangeBearing2DFactor::new(1.0, 0.0, 0.0, 0.1, Vec2::zeros(), 0.0).is_err());
    }
}
