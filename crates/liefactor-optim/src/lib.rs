//! Manifold-aware nonlinear least squares.
//!
//! Build a [`Problem`] from named parameter blocks (optionally on a Lie group
//! manifold) and residual blocks ([`Factor`]s with analytic Jacobians), then
//! minimize it with the Levenberg-Marquardt [`solve`]:
//!
//! ```
//! use liefactor_core::{LieGroup, So3, So3Parameterization, Vec3};
//! use liefactor_optim::{solve, factors::So3Factor, Problem, SolverOptions, SqrtInformation};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let measured = So3::exp(&Vec3::new(0.3, -0.2, 0.5));
//! let mut problem = Problem::new();
//! let q = problem.add_parameter_block(
//!     "q",
//!     So3::identity().to_array(),
//!     Some(Arc::new(So3Parameterization::default())),
//! )?;
//! let factor = So3Factor::new(measured, SqrtInformation::identity(3))?;
//! problem.add_residual_block(factor, None, &[q])?;
//!
//! let summary = solve(&SolverOptions::default(), &mut problem)?;
//! assert!(summary.is_converged());
//! let solved = So3::from_array(problem.parameter_block(q)?.values())?;
//! assert!(solved.is_approx(&measured, 1e-8));
//! # Ok(())
//! # }
//! ```

pub mod description;
pub mod error;
pub mod factors;
pub mod linear;
pub mod noise;
pub mod options;
pub mod problem;
pub mod robust;
pub mod solver;

pub use description::{ProblemDescription, SolveReport};
pub use error::{ConfigurationError, FactorError, SolveError};
pub use factors::{BlockSpec, Factor, JacobianFrame};
pub use linear::{LinearSolverError, LinearSolverType};
pub use noise::SqrtInformation;
pub use options::{IterationSummary, SolverOptions, Summary, TerminationStatus};
pub use problem::{Evaluation, ParamId, ParameterBlock, Problem, ResidualId};
pub use robust::RobustLoss;
pub use solver::solve;
