//! Levenberg-Marquardt trust region minimizer.
//!
//! Each iteration solves `(JᵀJ + D/μ) δ = -Jᵀr` where `D` is the clamped diagonal
//! of `JᵀJ` and `μ` the trust region radius, evaluates the candidate through each
//! block's parameterization, and accepts it when the ratio of actual to predicted
//! cost decrease is large enough. The radius follows Nielsen's update.

use std::time::Instant;

use liefactor_core::{DVec, Real};
use log::{debug, info, warn};

use crate::error::SolveError;
use crate::linear::solve_damped;
use crate::options::{IterationSummary, SolverOptions, Summary, TerminationStatus};
use crate::problem::{Executor, Problem};

/// Minimize the problem's cost, updating its parameter blocks in place.
///
/// Returns `Err` only for problems that cannot be started (invalid options,
/// factor errors at the initial point). Numerical failure and exhausted budgets
/// are reported through [`Summary::termination_status`]. Parameter blocks are
/// only written on accepted steps, and constant blocks are never written.
pub fn solve(options: &SolverOptions, problem: &mut Problem) -> Result<Summary, SolveError> {
    options.validate()?;
    let start = Instant::now();
    let exec = Executor::new(options.num_threads);
    let layout = problem.layout();
    problem.log_structure();

    let mut summary = Summary {
        termination_status: TerminationStatus::Failure,
        message: String::new(),
        initial_cost: 0.0,
        final_cost: 0.0,
        iterations_used: 0,
        num_successful_steps: 0,
        num_unsuccessful_steps: 0,
        iterations: Vec::new(),
        num_parameter_blocks: problem.num_parameter_blocks(),
        num_residual_blocks: problem.num_residual_blocks(),
        num_residuals: problem.num_residuals(),
        num_effective_parameters: layout.num_cols(),
        linear_solver_type: options.linear_solver_type,
        total_time_in_seconds: 0.0,
    };

    let mut lin = match problem.linearize_with(&layout, &exec, true) {
        Ok(lin) => lin,
        Err(SolveError::Factor { residual, source })
            if source == crate::error::FactorError::NonFiniteResidual =>
        {
            return Ok(finish(
                summary,
                start,
                TerminationStatus::Failure,
                format!("residual block {residual} is not finite at the initial point"),
            ));
        }
        Err(err) => return Err(err),
    };
    summary.initial_cost = lin.cost;
    summary.final_cost = lin.cost;

    if !lin.cost.is_finite() {
        return Ok(finish(
            summary,
            start,
            TerminationStatus::Failure,
            "initial cost is not finite".to_string(),
        ));
    }
    if problem.num_residual_blocks() == 0 {
        return Ok(finish(
            summary,
            start,
            TerminationStatus::Converged,
            "no residual blocks".to_string(),
        ));
    }
    if layout.num_cols() == 0 {
        return Ok(finish(
            summary,
            start,
            TerminationStatus::Converged,
            "all parameter blocks are constant".to_string(),
        ));
    }

    let mut radius = options.initial_trust_region_radius;
    let mut decrease_factor = 2.0;
    let mut gradient = lin.jacobian.tr_mul_vec(&lin.residual);

    for iteration in 0..options.max_num_iterations {
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > options.max_solver_time_in_seconds {
            warn!("wall-clock budget of {}s exhausted", options.max_solver_time_in_seconds);
            return Ok(finish(
                summary,
                start,
                TerminationStatus::NoConvergence,
                format!(
                    "maximum solver time of {}s reached",
                    options.max_solver_time_in_seconds
                ),
            ));
        }

        let gradient_max_norm = gradient.amax();
        if gradient_max_norm <= options.gradient_tolerance {
            return Ok(finish(
                summary,
                start,
                TerminationStatus::Converged,
                format!(
                    "gradient tolerance reached: {:.3e} <= {:.3e}",
                    gradient_max_norm, options.gradient_tolerance
                ),
            ));
        }

        summary.iterations_used = iteration + 1;
        let damping: DVec = lin
            .jacobian
            .column_norms_squared()
            .map(|d| d.clamp(options.min_lm_diagonal, options.max_lm_diagonal) / radius);

        let evaluated = solve_damped(
            options.linear_solver_type,
            &lin.jacobian,
            &lin.residual,
            &damping,
        )
        .map_err(|err| err.to_string())
        .and_then(|step| {
            let jd = lin.jacobian.mul_vec(&step);
            let predicted = -(gradient.dot(&step) + 0.5 * jd.norm_squared());
            let values = problem
                .candidate(&layout, &step)
                .map_err(|err| err.to_string())?;
            let cost = problem
                .cost_at(&values, &exec)
                .map_err(|err| err.to_string())?;
            Ok((step, predicted, values, cost))
        });

        let (step, predicted, values, new_cost) = match evaluated {
            Ok(result) => result,
            Err(reason) => {
                warn!("iteration {iteration}: step rejected ({reason})");
                (DVec::zeros(0), 0.0, Vec::new(), Real::INFINITY)
            }
        };

        let relative_decrease = if new_cost.is_finite() && predicted > 0.0 {
            (lin.cost - new_cost) / predicted
        } else {
            Real::NEG_INFINITY
        };
        let step_norm = step.norm();

        if relative_decrease > options.min_relative_decrease {
            let cost_change = lin.cost - new_cost;
            let old_cost = lin.cost;
            problem.commit(values);
            summary.num_successful_steps += 1;

            let factor = (1.0 - (2.0 * relative_decrease - 1.0).powi(3)).max(1.0 / 3.0);
            radius = (radius / factor).min(options.max_trust_region_radius);
            decrease_factor = 2.0;

            lin = problem.linearize_with(&layout, &exec, true)?;
            gradient = lin.jacobian.tr_mul_vec(&lin.residual);
            summary.final_cost = lin.cost;
            record(
                &mut summary,
                options,
                IterationSummary {
                    iteration,
                    cost: lin.cost,
                    cost_change,
                    gradient_max_norm,
                    step_norm,
                    relative_decrease,
                    trust_region_radius: radius,
                    step_is_successful: true,
                    cumulative_time_in_seconds: start.elapsed().as_secs_f64(),
                },
            );

            let x_norm = problem.free_values_norm();
            let ptol = options.parameter_tolerance;
            if step_norm <= ptol * (x_norm + ptol) {
                return Ok(finish(
                    summary,
                    start,
                    TerminationStatus::Converged,
                    format!(
                        "parameter tolerance reached: |step| {:.3e} <= {:.3e}",
                        step_norm,
                        ptol * (x_norm + ptol)
                    ),
                ));
            }
            if cost_change.abs() <= options.function_tolerance * old_cost {
                return Ok(finish(
                    summary,
                    start,
                    TerminationStatus::Converged,
                    format!(
                        "function tolerance reached: |cost change| / cost {:.3e} <= {:.3e}",
                        cost_change.abs() / old_cost,
                        options.function_tolerance
                    ),
                ));
            }
        } else {
            summary.num_unsuccessful_steps += 1;
            radius /= decrease_factor;
            decrease_factor *= 2.0;
            record(
                &mut summary,
                options,
                IterationSummary {
                    iteration,
                    cost: lin.cost,
                    cost_change: 0.0,
                    gradient_max_norm,
                    step_norm,
                    relative_decrease,
                    trust_region_radius: radius,
                    step_is_successful: false,
                    cumulative_time_in_seconds: start.elapsed().as_secs_f64(),
                },
            );
            if radius < options.min_trust_region_radius {
                return Ok(finish(
                    summary,
                    start,
                    TerminationStatus::Failure,
                    format!(
                        "trust region radius {:.3e} below minimum {:.3e}",
                        radius, options.min_trust_region_radius
                    ),
                ));
            }
        }
    }

    Ok(finish(
        summary,
        start,
        TerminationStatus::NoConvergence,
        format!(
            "maximum number of iterations reached ({})",
            options.max_num_iterations
        ),
    ))
}

fn record(summary: &mut Summary, options: &SolverOptions, it: IterationSummary) {
    let line = format!(
        "iter {:>4}  cost {:.6e}  cost_change {:.3e}  |gradient| {:.3e}  |step| {:.3e}  rho {:.3e}  radius {:.3e}  {}",
        it.iteration,
        it.cost,
        it.cost_change,
        it.gradient_max_norm,
        it.step_norm,
        it.relative_decrease,
        it.trust_region_radius,
        if it.step_is_successful { "accepted" } else { "rejected" }
    );
    if options.verbose {
        info!("{line}");
    } else {
        debug!("{line}");
    }
    summary.iterations.push(it);
}

fn finish(
    mut summary: Summary,
    start: Instant,
    status: TerminationStatus,
    message: String,
) -> Summary {
    summary.termination_status = status;
    summary.message = message;
    summary.total_time_in_seconds = start.elapsed().as_secs_f64();
    info!("{}: {}", summary.brief_report(), summary.message);
    summary
}
