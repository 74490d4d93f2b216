//! Serializable problem description used by the command-line runner.
//!
//! A description lists named parameter blocks and the factors that connect
//! them. It is compiled into a [`Problem`], solved, and the solved values are
//! returned keyed by block name.

use std::collections::BTreeMap;

use liefactor_core::{DMat, LieGroup, ManifoldKind, Real, Se2, Se3, So2, So3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, SolveError};
use crate::factors::{
    AltFactor, Factor, OffsetFactor, PriorFactor, RangeBearing2DFactor, RangeFactor,
    RelativeFactor, TimeSyncAttFactor,
};
use crate::noise::SqrtInformation;
use crate::options::{SolverOptions, Summary};
use crate::problem::{ParamId, Problem};
use crate::robust::RobustLoss;
use crate::solver::solve;

/// A parameter block in a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(default = "euclidean")]
    pub manifold: ManifoldKind,
    pub values: Vec<Real>,
    #[serde(default)]
    pub constant: bool,
}

fn euclidean() -> ManifoldKind {
    ManifoldKind::Euclidean
}

/// Noise model of a factor. Omitted means unit information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseDescription {
    /// Row-major information matrix.
    Information(Vec<Vec<Real>>),
    /// Row-major covariance matrix.
    Covariance(Vec<Vec<Real>>),
    Sigmas(Vec<Real>),
}

impl NoiseDescription {
    fn build(noise: Option<&Self>, dim: usize) -> Result<SqrtInformation, ConfigurationError> {
        match noise {
            None => Ok(SqrtInformation::identity(dim)),
            Some(NoiseDescription::Information(rows)) => {
                SqrtInformation::from_information(&matrix_from_rows(rows)?)
            }
            Some(NoiseDescription::Covariance(rows)) => {
                SqrtInformation::from_covariance(&matrix_from_rows(rows)?)
            }
            Some(NoiseDescription::Sigmas(sigmas)) => SqrtInformation::from_sigmas(sigmas),
        }
    }
}

fn matrix_from_rows(rows: &[Vec<Real>]) -> Result<DMat, ConfigurationError> {
    let n = rows.len();
    if rows.iter().any(|r| r.len() != n) {
        return Err(ConfigurationError::InvalidNoise(
            "noise matrix must be square".to_string(),
        ));
    }
    Ok(DMat::from_row_iterator(
        n,
        n,
        rows.iter().flat_map(|r| r.iter().copied()),
    ))
}

/// Factor variants that can be described in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactorDescription {
    /// Absolute measurement of a group element.
    Prior {
        manifold: ManifoldKind,
        measured: Vec<Real>,
        #[serde(default)]
        noise: Option<NoiseDescription>,
        param: String,
    },
    /// Relative measurement from `from` to `to`.
    Relative {
        manifold: ManifoldKind,
        measured: Vec<Real>,
        #[serde(default)]
        noise: Option<NoiseDescription>,
        from: String,
        to: String,
    },
    /// Offset between `measured` and `reference = measured · offset`.
    Offset {
        manifold: ManifoldKind,
        reference: Vec<Real>,
        measured: Vec<Real>,
        #[serde(default)]
        noise: Option<NoiseDescription>,
        param: String,
    },
    TimeSyncAtt {
        q_ref: Vec<Real>,
        q: Vec<Real>,
        omega: [Real; 3],
        #[serde(default)]
        noise: Option<NoiseDescription>,
        param: String,
    },
    RangeBearing2d {
        range: Real,
        sigma_range: Real,
        bearing: Real,
        sigma_bearing: Real,
        position: [Real; 2],
        heading: Real,
        landmark: String,
        heading_error: String,
    },
    Range {
        range: Real,
        sigma: Real,
        anchor: [Real; 3],
        param: String,
    },
    Alt {
        altitude: Real,
        sigma: Real,
        param: String,
    },
}

/// A factor plus its robust loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualDescription {
    pub factor: FactorDescription,
    #[serde(default)]
    pub loss: RobustLoss,
}

/// Complete problem: parameter blocks, residuals and optional solver options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProblemDescription {
    pub parameters: Vec<ParameterDescription>,
    pub residuals: Vec<ResidualDescription>,
    #[serde(default)]
    pub options: Option<SolverOptions>,
}

/// Solved values keyed by block name, with the solver summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub summary: Summary,
    pub parameters: BTreeMap<String, Vec<Real>>,
}

impl SolveReport {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn prior<G: LieGroup>(
    measured: &[Real],
    noise: Option<&NoiseDescription>,
) -> Result<Box<dyn Factor>, ConfigurationError> {
    let noise = NoiseDescription::build(noise, G::DOF)?;
    Ok(Box::new(PriorFactor::new(G::from_array(measured)?, noise)?))
}

fn relative<G: LieGroup>(
    measured: &[Real],
    noise: Option<&NoiseDescription>,
) -> Result<Box<dyn Factor>, ConfigurationError> {
    let noise = NoiseDescription::build(noise, G::DOF)?;
    Ok(Box::new(RelativeFactor::new(G::from_array(measured)?, noise)?))
}

fn offset<G: LieGroup>(
    reference: &[Real],
    measured: &[Real],
    noise: Option<&NoiseDescription>,
) -> Result<Box<dyn Factor>, ConfigurationError> {
    let noise = NoiseDescription::build(noise, G::DOF)?;
    Ok(Box::new(OffsetFactor::new(
        G::from_array(reference)?,
        G::from_array(measured)?,
        noise,
    )?))
}

fn unsupported(what: &str, kind: ManifoldKind) -> ConfigurationError {
    ConfigurationError::UnsupportedFactor(format!("{what} factor on {kind:?}"))
}

impl FactorDescription {
    /// Build the factor and return it with the names of its blocks, in order.
    pub fn build(&self) -> Result<(Box<dyn Factor>, Vec<&str>), ConfigurationError> {
        let built = match self {
            FactorDescription::Prior {
                manifold,
                measured,
                noise,
                param,
            } => {
                let f = match manifold {
                    ManifoldKind::SO2 => prior::<So2>(measured, noise.as_ref())?,
                    ManifoldKind::SO3 => prior::<So3>(measured, noise.as_ref())?,
                    ManifoldKind::SE2 => prior::<Se2>(measured, noise.as_ref())?,
                    ManifoldKind::SE3 => prior::<Se3>(measured, noise.as_ref())?,
                    ManifoldKind::Euclidean => return Err(unsupported("prior", *manifold)),
                };
                (f, vec![param.as_str()])
            }
            FactorDescription::Relative {
                manifold,
                measured,
                noise,
                from,
                to,
            } => {
                let f = match manifold {
                    ManifoldKind::SO2 => relative::<So2>(measured, noise.as_ref())?,
                    ManifoldKind::SO3 => relative::<So3>(measured, noise.as_ref())?,
                    ManifoldKind::SE2 => relative::<Se2>(measured, noise.as_ref())?,
                    ManifoldKind::SE3 => relative::<Se3>(measured, noise.as_ref())?,
                    ManifoldKind::Euclidean => return Err(unsupported("relative", *manifold)),
                };
                (f, vec![from.as_str(), to.as_str()])
            }
            FactorDescription::Offset {
                manifold,
                reference,
                measured,
                noise,
                param,
            } => {
                let f = match manifold {
                    ManifoldKind::SO3 => offset::<So3>(reference, measured, noise.as_ref())?,
                    ManifoldKind::SE3 => offset::<Se3>(reference, measured, noise.as_ref())?,
                    other => return Err(unsupported("offset", *other)),
                };
                (f, vec![param.as_str()])
            }
            FactorDescription::TimeSyncAtt {
                q_ref,
                q,
                omega,
                noise,
                param,
            } => {
                let f = TimeSyncAttFactor::new(
                    So3::from_array(q_ref)?,
                    So3::from_array(q)?,
                    Vec3::from(*omega),
                    NoiseDescription::build(noise.as_ref(), 3)?,
                )?;
                (Box::new(f) as Box<dyn Factor>, vec![param.as_str()])
            }
            FactorDescription::RangeBearing2d {
                range,
                sigma_range,
                bearing,
                sigma_bearing,
                position,
                heading,
                landmark,
                heading_error,
            } => {
                let f = RangeBearing2DFactor::new(
                    *range,
                    *sigma_range,
                    *bearing,
                    *sigma_bearing,
                    Vec2::from(*position),
                    *heading,
                )?;
                (
                    Box::new(f) as Box<dyn Factor>,
                    vec![landmark.as_str(), heading_error.as_str()],
                )
            }
            FactorDescription::Range {
                range,
                sigma,
                anchor,
                param,
            } => {
                let f = RangeFactor::new(*range, *sigma, Vec3::from(*anchor))?;
                (Box::new(f) as Box<dyn Factor>, vec![param.as_str()])
            }
            FactorDescription::Alt {
                altitude,
                sigma,
                param,
            } => {
                let f = AltFactor::new(*altitude, *sigma)?;
                (Box::new(f) as Box<dyn Factor>, vec![param.as_str()])
            }
        };
        Ok(built)
    }
}

impl ProblemDescription {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Compile into a [`Problem`].
    pub fn build(&self) -> Result<Problem, ConfigurationError> {
        let mut problem = Problem::new();
        for p in &self.parameters {
            let id = problem.add_manifold_block(p.name.clone(), p.values.clone(), p.manifold)?;
            if p.constant {
                problem.set_parameter_block_constant(id)?;
            }
        }
        for r in &self.residuals {
            let (factor, names) = r.factor.build()?;
            let ids = names
                .iter()
                .map(|name| {
                    problem
                        .param_by_name(name)
                        .ok_or_else(|| ConfigurationError::UnknownParameterName(name.to_string()))
                })
                .collect::<Result<Vec<ParamId>, _>>()?;
            problem.add_boxed_residual_block(factor, Some(r.loss), &ids)?;
        }
        Ok(problem)
    }

    /// Build, solve with `options` (or the embedded options, or defaults), and report.
    pub fn solve(&self, options: Option<&SolverOptions>) -> Result<SolveReport, SolveError> {
        let mut problem = self.build()?;
        let options = options
            .or(self.options.as_ref())
            .cloned()
            .unwrap_or_default();
        let summary = solve(&options, &mut problem)?;
        let parameters = problem
            .parameter_blocks()
            .map(|(_, b)| (b.name().to_string(), b.values().to_vec()))
            .collect();
        Ok(SolveReport {
            summary,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIOR_JSON: &str = r#"{
        "parameters": [
            {"name": "q", "manifold": "SO3", "values": [1.0, 0.0, 0.0, 0.0]}
        ],
        "residuals": [
            {"factor": {"type": "prior", "manifold": "SO3",
                        "measured": [0.8775825618903728, 0.479425538604203, 0.0, 0.0],
                        "noise": {"sigmas": [0.1, 0.1, 0.1]},
                        "param": "q"}}
        ]
    }"#;

    #[test]
    fn parses_and_solves_prior() {
        let desc = ProblemDescription::from_json(PRIOR_JSON).unwrap();
        let report = desc.solve(None).unwrap();
        assert!(report.summary.is_converged(), "{}", report.summary);
        let q = &report.parameters["q"];
        let expected = [0.8775825618903728, 0.479425538604203, 0.0, 0.0];
        for (a, b) in q.iter().zip(expected) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }

    #[test]
    fn unknown_block_name_is_configuration_error() {
        let mut desc: ProblemDescription = serde_json::from_str(PRIOR_JSON).unwrap();
        desc.parameters[0].name = "other".to_string();
        assert_eq!(
            desc.build().unwrap_err(),
            ConfigurationError::UnknownParameterName("q".to_string())
        );
    }

    #[test]
    fn euclidean_prior_is_unsupported() {
        let f = FactorDescription::Prior {
            manifold: ManifoldKind::Euclidean,
            measured: vec![0.0],
            noise: None,
            param: "x".to_string(),
        };
        assert!(matches!(
            f.build(),
            Err(ConfigurationError::UnsupportedFactor(_))
        ));
    }

    #[test]
    fn non_square_noise_is_rejected() {
        let noise = NoiseDescription::Information(vec![vec![1.0, 0.0], vec![0.0]]);
        assert!(NoiseDescription::build(Some(&noise), 2).is_err());
    }
}
