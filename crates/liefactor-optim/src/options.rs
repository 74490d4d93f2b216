//! Solver configuration and the report produced by a solve.

use std::fmt;

use liefactor_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::linear::LinearSolverType;

/// Levenberg-Marquardt settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Maximum number of LM iterations (accepted or rejected steps).
    pub max_num_iterations: usize,
    pub linear_solver_type: LinearSolverType,
    /// Log every iteration at `info` level instead of `debug`.
    pub verbose: bool,
    /// Stop when an accepted step changes the cost by at most this relative amount.
    pub function_tolerance: Real,
    /// Stop when the max-norm of the gradient is at most this value.
    pub gradient_tolerance: Real,
    /// Stop when `|δ| <= parameter_tolerance * (|x| + parameter_tolerance)`.
    pub parameter_tolerance: Real,
    pub initial_trust_region_radius: Real,
    pub max_trust_region_radius: Real,
    /// The solve fails once the radius shrinks below this value.
    pub min_trust_region_radius: Real,
    /// Minimum ratio of actual to predicted cost decrease for a step to be accepted.
    pub min_relative_decrease: Real,
    /// Lower clamp on the diagonal of `JᵀJ` used for damping.
    pub min_lm_diagonal: Real,
    /// Upper clamp on the diagonal of `JᵀJ` used for damping.
    pub max_lm_diagonal: Real,
    /// Wall-clock budget.
    pub max_solver_time_in_seconds: Real,
    /// Threads for residual evaluation: `0` uses rayon's global pool, `1` is sequential.
    pub num_threads: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_num_iterations: 50,
            linear_solver_type: LinearSolverType::DenseQr,
            verbose: false,
            function_tolerance: 1e-6,
            gradient_tolerance: 1e-10,
            parameter_tolerance: 1e-8,
            initial_trust_region_radius: 1e4,
            max_trust_region_radius: 1e16,
            min_trust_region_radius: 1e-32,
            min_relative_decrease: 1e-3,
            min_lm_diagonal: 1e-6,
            max_lm_diagonal: 1e32,
            max_solver_time_in_seconds: 1e6,
            num_threads: 1,
        }
    }
}

impl SolverOptions {
    /// Check that tolerances and radii are usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let non_negative = [
            ("function_tolerance", self.function_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
            ("max_solver_time_in_seconds", self.max_solver_time_in_seconds),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigurationError::InvalidOption(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        let positive = [
            ("initial_trust_region_radius", self.initial_trust_region_radius),
            ("max_trust_region_radius", self.max_trust_region_radius),
            ("min_trust_region_radius", self.min_trust_region_radius),
            ("min_lm_diagonal", self.min_lm_diagonal),
            ("max_lm_diagonal", self.max_lm_diagonal),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigurationError::InvalidOption(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.min_trust_region_radius > self.initial_trust_region_radius
            || self.initial_trust_region_radius > self.max_trust_region_radius
        {
            return Err(ConfigurationError::InvalidOption(
                "trust region radii must satisfy min <= initial <= max".to_string(),
            ));
        }
        if self.min_lm_diagonal > self.max_lm_diagonal {
            return Err(ConfigurationError::InvalidOption(
                "min_lm_diagonal must not exceed max_lm_diagonal".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.min_relative_decrease) {
            return Err(ConfigurationError::InvalidOption(format!(
                "min_relative_decrease must lie in [0, 1), got {}",
                self.min_relative_decrease
            )));
        }
        Ok(())
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    /// A tolerance was met.
    Converged,
    /// The iteration or time budget ran out first.
    NoConvergence,
    /// The solver could not make progress (non-finite cost, collapsed trust region).
    Failure,
}

impl TerminationStatus {
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            TerminationStatus::Converged | TerminationStatus::NoConvergence
        )
    }
}

/// Per-iteration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: usize,
    /// Cost after the iteration (unchanged if the step was rejected).
    pub cost: Real,
    pub cost_change: Real,
    pub gradient_max_norm: Real,
    pub step_norm: Real,
    /// Ratio of actual to predicted decrease.
    pub relative_decrease: Real,
    pub trust_region_radius: Real,
    pub step_is_successful: bool,
    pub cumulative_time_in_seconds: Real,
}

/// Report of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub termination_status: TerminationStatus,
    pub message: String,
    pub initial_cost: Real,
    pub final_cost: Real,
    pub iterations_used: usize,
    pub num_successful_steps: usize,
    pub num_unsuccessful_steps: usize,
    pub iterations: Vec<IterationSummary>,
    pub num_parameter_blocks: usize,
    pub num_residual_blocks: usize,
    pub num_residuals: usize,
    pub num_effective_parameters: usize,
    pub linear_solver_type: LinearSolverType,
    pub total_time_in_seconds: Real,
}

impl Summary {
    pub fn is_converged(&self) -> bool {
        self.termination_status == TerminationStatus::Converged
    }

    /// One-line report.
    pub fn brief_report(&self) -> String {
        format!(
            "LM: iterations {}, initial cost {:.6e}, final cost {:.6e}, termination {:?}",
            self.iterations_used, self.initial_cost, self.final_cost, self.termination_status
        )
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solver summary")?;
        writeln!(f, "  parameter blocks   {:>10}", self.num_parameter_blocks)?;
        writeln!(f, "  effective params   {:>10}", self.num_effective_parameters)?;
        writeln!(f, "  residual blocks    {:>10}", self.num_residual_blocks)?;
        writeln!(f, "  residuals          {:>10}", self.num_residuals)?;
        writeln!(f, "  linear solver      {:>10?}", self.linear_solver_type)?;
        writeln!(f)?;
        writeln!(f, "  initial cost       {:.6e}", self.initial_cost)?;
        writeln!(f, "  final cost         {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "  iterations         {} ({} successful, {} unsuccessful)",
            self.iterations_used, self.num_successful_steps, self.num_unsuccessful_steps
        )?;
        writeln!(f, "  total time (s)     {:.6}", self.total_time_in_seconds)?;
        write!(
            f,
            "  termination        {:?} ({})",
            self.termination_status, self.message
        )
    }
}
