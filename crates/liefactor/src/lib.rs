//! Manifold-aware nonlinear least squares on SO(2), SO(3), SE(2) and SE(3).
//!
//! This crate re-exports the workspace crates under one roof:
//!
//! - [`core`]: Lie groups, flat layouts and local parameterizations.
//! - [`optim`]: factors, the problem builder and the Levenberg-Marquardt solver.
//!
//! Most users only need the [`prelude`]:
//!
//! ```
//! use liefactor::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let a = Se2::from_xy_theta(0.0, 0.0, 0.0);
//! let b = Se2::from_xy_theta(1.0, 0.0, 0.5);
//!
//! let mut problem = Problem::new();
//! let x0 = problem.add_manifold_block("x0", a.to_array(), ManifoldKind::SE2)?;
//! let x1 = problem.add_manifold_block("x1", a.to_array(), ManifoldKind::SE2)?;
//! problem.set_parameter_block_constant(x0)?;
//! problem.add_residual_block(
//!     RelSe2Factor::new(a.inverse() * b, SqrtInformation::identity(3))?,
//!     None,
//!     &[x0, x1],
//! )?;
//!
//! let summary = solve(&SolverOptions::default(), &mut problem)?;
//! assert!(summary.is_converged());
//! assert!(Se2::from_array(problem.parameter_block(x1)?.values())?.is_approx(&b, 1e-9));
//! # Ok(())
//! # }
//! ```

pub use liefactor_core as core;
pub use liefactor_optim as optim;

pub mod prelude {
    pub use liefactor_core::{
        LieGroup, LocalParameterization, ManifoldKind, Real, Se2, Se3, So2, So3, Vec2, Vec3,
    };
    pub use liefactor_optim::factors::*;
    pub use liefactor_optim::{
        solve, ConfigurationError, Factor, ParamId, Problem, ProblemDescription, RobustLoss,
        SolveError, SolverOptions, SqrtInformation, Summary, TerminationStatus,
    };
}
