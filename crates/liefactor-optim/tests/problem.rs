use std::sync::Arc;

use liefactor_core::test_utils::{gaussian, seeded_rng};
use liefactor_core::{
    DMat, DVec, LieGroup, LocalParameterization, ManifoldError, ManifoldKind, Real, Se2,
    Se2Parameterization, So2Parameterization, So3, So3Parameterization, Vec2, Vec3,
};
use liefactor_optim::factors::{
    BlockSpec, NumericDiffFactor, RangeBearing2DFactor, RelSe2Factor, RelSe3Factor, Se2Factor,
    So3Factor,
};
use liefactor_optim::{
    solve, ConfigurationError, Factor, FactorError, LinearSolverType, ParamId, Problem,
    RobustLoss, SolverOptions, SqrtInformation, TerminationStatus,
};

fn so3_block(problem: &mut Problem, name: &str) -> ParamId {
    problem
        .add_parameter_block(
            name,
            So3::identity().to_array(),
            Some(Arc::new(So3Parameterization::default())),
        )
        .unwrap()
}

fn unit_so3_factor() -> So3Factor {
    So3Factor::new(
        So3::exp(&Vec3::new(0.1, 0.2, 0.3)),
        SqrtInformation::identity(3),
    )
    .unwrap()
}

#[test]
fn rejects_unknown_parameter_block() {
    let mut problem = Problem::new();
    let err = problem
        .add_residual_block(unit_so3_factor(), None, &[ParamId(3)])
        .unwrap_err();
    assert_eq!(err, ConfigurationError::UnknownParameterBlock(ParamId(3)));
    assert!(problem.set_parameter_block_constant(ParamId(0)).is_err());
}

#[test]
fn rejects_mismatched_blocks() {
    let mut problem = Problem::new();
    let small = problem.add_parameter_block("small", vec![0.0; 3], None).unwrap();
    let flat = problem.add_parameter_block("flat", vec![1.0, 0.0, 0.0, 0.0], None).unwrap();
    let q = so3_block(&mut problem, "q");

    assert!(matches!(
        problem.add_residual_block(unit_so3_factor(), None, &[small]),
        Err(ConfigurationError::BlockSizeMismatch { expected: 4, actual: 3, .. })
    ));
    assert!(matches!(
        problem.add_residual_block(unit_so3_factor(), None, &[flat]),
        Err(ConfigurationError::ManifoldMismatch {
            expected: ManifoldKind::SO3,
            actual: ManifoldKind::Euclidean,
            ..
        })
    ));
    assert!(matches!(
        problem.add_residual_block(unit_so3_factor(), None, &[q, q]),
        Err(ConfigurationError::ParameterCountMismatch { expected: 1, actual: 2 })
    ));
    assert_eq!(problem.num_residual_blocks(), 0);
    problem.add_residual_block(unit_so3_factor(), None, &[q]).unwrap();
    assert_eq!(problem.num_residual_blocks(), 1);
}

#[test]
fn rejects_duplicate_names_and_parameters() {
    let mut problem = Problem::new();
    let a = so3_block(&mut problem, "a");
    let err = problem
        .add_parameter_block("a", vec![0.0], None)
        .unwrap_err();
    assert_eq!(err, ConfigurationError::DuplicateParameterName("a".to_string()));

    let pose = problem
        .add_manifold_block("pose", Se2::identity().to_array(), ManifoldKind::SE2)
        .unwrap();
    let rel = RelSe2Factor::new(Se2::identity(), SqrtInformation::identity(3)).unwrap();
    assert_eq!(
        problem.add_residual_block(rel, None, &[pose, pose]).unwrap_err(),
        ConfigurationError::DuplicateParameterInResidual("pose".to_string())
    );
    assert_eq!(problem.param_by_name("a"), Some(a));
}

/// Factor without residuals, used to check registration rejects it.
#[derive(Debug)]
struct EmptyFactor;

impl Factor for EmptyFactor {
    fn residual_dim(&self) -> usize {
        0
    }

    fn parameter_specs(&self) -> Vec<BlockSpec> {
        vec![BlockSpec::euclidean(1)]
    }

    fn evaluate(
        &self,
        _params: &[&[Real]],
        _jacobians: Option<&mut [DMat]>,
    ) -> Result<DVec, FactorError> {
        Ok(DVec::zeros(0))
    }
}

#[test]
fn rejects_zero_dimensional_residual() {
    let mut problem = Problem::new();
    let x = problem.add_parameter_block("x", vec![1.0], None).unwrap();
    assert!(matches!(
        problem.add_residual_block(EmptyFactor, None, &[x]),
        Err(ConfigurationError::UnsupportedFactor(_))
    ));

    // a regular factor next to it still solves with the sparse backend
    let f = NumericDiffFactor::new(vec![BlockSpec::euclidean(1)], 1, |p| {
        Ok(DVec::from_element(1, p[0][0] - 3.0))
    })
    .unwrap();
    problem.add_residual_block(f, None, &[x]).unwrap();
    let opts = SolverOptions {
        linear_solver_type: LinearSolverType::SparseNormalCholesky,
        ..SolverOptions::default()
    };
    assert!((problem.cost().unwrap() - 2.0).abs() < 1e-12);
    let summary = solve(&opts, &mut problem).unwrap();
    assert!(summary.is_converged(), "{summary}");
    assert!((problem.parameter_block(x).unwrap().values()[0] - 3.0).abs() < 1e-8);
    assert!(problem.cost().unwrap() < 1e-16);
}

#[test]
fn rejects_manifold_invariant_violations() {
    let mut problem = Problem::new();
    let err = problem
        .add_parameter_block(
            "q",
            vec![0.9, 0.0, 0.0, 0.0],
            Some(Arc::new(So3Parameterization::default())),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::Manifold(ManifoldError::NotNormalized { .. })
    ));
    let err = problem
        .add_parameter_block("x", vec![1.0, 0.0], Some(Arc::new(So3Parameterization::default())))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::ParameterizationSizeMismatch { expected: 4, actual: 2, .. }
    ));
}

#[test]
fn rejects_non_positive_definite_information() {
    let info = DMat::from_diagonal(&DVec::from_column_slice(&[1.0, -1.0, 1.0]));
    let err = So3Factor::from_array(&So3::identity().to_array(), &info).unwrap_err();
    assert_eq!(err, ConfigurationError::InvalidInformation);
}

#[test]
fn empty_and_all_constant_problems_converge_trivially() {
    let mut problem = Problem::new();
    let summary = solve(&SolverOptions::default(), &mut problem).unwrap();
    assert_eq!(summary.termination_status, TerminationStatus::Converged);

    let q = so3_block(&mut problem, "q");
    problem.add_residual_block(unit_so3_factor(), None, &[q]).unwrap();
    problem.set_parameter_block_constant(q).unwrap();
    let summary = solve(&SolverOptions::default(), &mut problem).unwrap();
    assert_eq!(summary.termination_status, TerminationStatus::Converged);
    assert_eq!(summary.num_effective_parameters, 0);
    assert_eq!(problem.parameter_block(q).unwrap().values(), &[1.0, 0.0, 0.0, 0.0]);
    assert!(summary.final_cost > 0.0);
}

#[test]
fn invalid_options_are_rejected() {
    let mut problem = Problem::new();
    let opts = SolverOptions {
        min_trust_region_radius: 1.0,
        initial_trust_region_radius: 0.5,
        ..SolverOptions::default()
    };
    assert!(solve(&opts, &mut problem).is_err());
}

#[test]
fn non_finite_initial_residual_is_reported_as_failure() {
    let mut problem = Problem::new();
    let x = problem.add_parameter_block("x", vec![1.0], None).unwrap();
    let f = NumericDiffFactor::new(vec![BlockSpec::euclidean(1)], 1, |p| {
        Ok(DVec::from_element(1, p[0][0].ln() / 0.0))
    })
    .unwrap();
    problem.add_residual_block(f, None, &[x]).unwrap();
    let summary = solve(&SolverOptions::default(), &mut problem).unwrap();
    assert_eq!(summary.termination_status, TerminationStatus::Failure);
    assert_eq!(problem.parameter_block(x).unwrap().values(), &[1.0]);
}

/// Noise-free SE(2) pose chain closed into a loop, anchored by a prior on the first pose.
fn pose_loop(num_poses: usize, perturb: f64) -> (Problem, Vec<ParamId>, Vec<Se2>) {
    let mut rng = seeded_rng(9);
    let truth: Vec<Se2> = (0..num_poses)
        .map(|i| {
            let a = i as f64 * std::f64::consts::TAU / num_poses as f64;
            Se2::from_xy_theta(3.0 * a.cos(), 3.0 * a.sin(), a + std::f64::consts::FRAC_PI_2)
        })
        .collect();
    let mut problem = Problem::new();
    let ids: Vec<ParamId> = truth
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let noisy = t.plus(&Vec3::new(
                perturb * gaussian(&mut rng),
                perturb * gaussian(&mut rng),
                perturb * gaussian(&mut rng),
            ));
            problem
                .add_parameter_block(
                    format!("x{i}"),
                    noisy.to_array(),
                    Some(Arc::new(Se2Parameterization::default())),
                )
                .unwrap()
        })
        .collect();
    problem
        .add_residual_block(
            Se2Factor::new(truth[0], SqrtInformation::isotropic(3, 0.01).unwrap()).unwrap(),
            None,
            &[ids[0]],
        )
        .unwrap();
    for i in 0..num_poses {
        let j = (i + 1) % num_poses;
        let measured = truth[i].inverse() * truth[j];
        let noise = SqrtInformation::from_sigmas(&[0.1, 0.1, 0.05]).unwrap();
        problem
            .add_residual_block(
                RelSe2Factor::new(measured, noise).unwrap(),
                None,
                &[ids[i], ids[j]],
            )
            .unwrap();
    }
    (problem, ids, truth)
}

#[test]
fn linear_solvers_agree_on_pose_loop() {
    let mut results = Vec::new();
    for kind in [
        LinearSolverType::DenseQr,
        LinearSolverType::DenseNormalCholesky,
        LinearSolverType::SparseNormalCholesky,
    ] {
        let (mut problem, ids, truth) = pose_loop(12, 0.2);
        let opts = SolverOptions {
            linear_solver_type: kind,
            ..SolverOptions::default()
        };
        let summary = solve(&opts, &mut problem).unwrap();
        assert!(summary.is_converged(), "{:?}: {}", kind, summary);
        for (id, t) in ids.iter().zip(&truth) {
            let est = Se2::from_array(problem.parameter_block(*id).unwrap().values()).unwrap();
            assert!(est.is_approx(t, 1e-6), "{:?}: pose error {}", kind, (est - *t).norm());
        }
        results.push(problem.parameter_block(ids[5]).unwrap().values().to_vec());
    }
    for r in &results[1..] {
        for (a, b) in r.iter().zip(&results[0]) {
            assert!((a - b).abs() < 1e-8);
        }
    }
}

#[test]
fn parallel_evaluation_matches_sequential() {
    let (mut seq, ids, _) = pose_loop(30, 0.3);
    let (mut par, _, _) = pose_loop(30, 0.3);
    let s1 = solve(&SolverOptions::default(), &mut seq).unwrap();
    let s2 = solve(
        &SolverOptions {
            num_threads: 4,
            ..SolverOptions::default()
        },
        &mut par,
    )
    .unwrap();
    assert_eq!(s1.iterations_used, s2.iterations_used);
    assert_eq!(s1.final_cost.to_bits(), s2.final_cost.to_bits());
    for id in ids {
        assert_eq!(
            seq.parameter_block(id).unwrap().values(),
            par.parameter_block(id).unwrap().values()
        );
    }
}

#[test]
fn independent_problems_solve_concurrently() {
    let handles: Vec<_> = (0..4)
        .map(|k| {
            std::thread::spawn(move || {
                let (mut problem, ids, truth) = pose_loop(8 + k, 0.1);
                let summary = solve(&SolverOptions::default(), &mut problem).unwrap();
                let values = problem.parameter_block(ids[1]).unwrap().values();
                let est = Se2::from_array(values).unwrap();
                (summary.is_converged(), est.is_approx(&truth[1], 1e-6))
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), (true, true));
    }
}

#[test]
fn iteration_and_time_budgets_stop_the_solver() {
    let (mut problem, _, _) = pose_loop(12, 0.3);
    let opts = SolverOptions {
        max_num_iterations: 1,
        ..SolverOptions::default()
    };
    let summary = solve(&opts, &mut problem).unwrap();
    assert_eq!(summary.termination_status, TerminationStatus::NoConvergence);
    assert_eq!(summary.iterations_used, 1);
    assert_eq!(summary.iterations.len(), 1);

    let (mut problem, _, _) = pose_loop(12, 0.3);
    let opts = SolverOptions {
        max_solver_time_in_seconds: 0.0,
        ..SolverOptions::default()
    };
    let summary = solve(&opts, &mut problem).unwrap();
    assert_eq!(summary.termination_status, TerminationStatus::NoConvergence);
    assert_eq!(summary.iterations_used, 0);
    assert_eq!(summary.final_cost, summary.initial_cost);
}

#[test]
fn jacobian_with_ambient_factor_matches_finite_differences() {
    let mut problem = Problem::new();
    let l = problem.add_parameter_block("l", vec![4.0, -1.0], None).unwrap();
    let r = problem
        .add_parameter_block(
            "r",
            vec![0.3f64.cos(), 0.3f64.sin()],
            Some(Arc::new(So2Parameterization::default())),
        )
        .unwrap();
    for (k, p) in [Vec2::new(0.0, 0.0), Vec2::new(1.0, 2.0), Vec2::new(-2.0, 0.5)]
        .iter()
        .enumerate()
    {
        let f = RangeBearing2DFactor::new(4.0, 0.1, 0.2 * k as f64, 0.05, *p, 0.4).unwrap();
        problem.add_residual_block(f, None, &[l, r]).unwrap();
    }
    let jac = problem.jacobian().unwrap();
    assert_eq!(jac.shape(), (6, 3));

    let h = 1e-6;
    let base_l = problem.parameter_block(l).unwrap().values().to_vec();
    let base_r = problem.parameter_block(r).unwrap().values().to_vec();
    let so2 = So2Parameterization::default();
    for col in 0..3 {
        let mut eval = |sign: f64| {
            let mut lv = base_l.clone();
            let mut rv = base_r.clone();
            if col < 2 {
                lv[col] += sign * h;
            } else {
                so2.plus(&base_r, &[sign * h], &mut rv).unwrap();
            }
            problem.set_parameter_values(l, &lv).unwrap();
            problem.set_parameter_values(r, &rv).unwrap();
            problem.evaluate().unwrap().residuals
        };
        let fd = (eval(1.0) - eval(-1.0)) / (2.0 * h);
        let diff = (fd - jac.column(col)).amax();
        assert!(diff < 1e-5, "column {col}: off by {diff}");
    }
}

#[test]
fn robust_loss_downweights_outliers() {
    let data = [1.0, 1.1, 0.9, 1.05, 0.95, 8.0, 6.0];
    let fit = |loss: Option<RobustLoss>| {
        let mut problem = Problem::new();
        let x = problem.add_parameter_block("x", vec![0.0], None).unwrap();
        for y in data {
            let f = NumericDiffFactor::new(vec![BlockSpec::euclidean(1)], 1, move |p| {
                Ok(DVec::from_element(1, p[0][0] - y))
            })
            .unwrap();
            problem.add_residual_block(f, loss, &[x]).unwrap();
        }
        let summary = solve(&SolverOptions::default(), &mut problem).unwrap();
        assert!(summary.termination_status.is_usable(), "{}", summary);
        problem.parameter_block(x).unwrap().values()[0]
    };
    let plain = fit(None);
    let robust = fit(Some(RobustLoss::Cauchy { scale: 0.2 }));
    assert!((plain - data.iter().sum::<f64>() / data.len() as f64).abs() < 1e-6);
    assert!((robust - 1.0).abs() < (plain - 1.0).abs(), "robust {robust} vs plain {plain}");
    assert!((robust - 1.0).abs() < 0.1, "robust estimate {robust}");
}

#[test]
fn relative_factor_requires_matching_manifolds() {
    let mut problem = Problem::new();
    let a = problem
        .add_manifold_block("a", Se2::identity().to_array(), ManifoldKind::SE2)
        .unwrap();
    let b = problem
        .add_manifold_block("b", Se2::identity().to_array(), ManifoldKind::SE2)
        .unwrap();
    let rel3 = RelSe3Factor::new(
        liefactor_core::Se3::identity(),
        SqrtInformation::identity(6),
    )
    .unwrap();
    assert!(matches!(
        problem.add_residual_block(rel3, None, &[a, b]),
        Err(ConfigurationError::BlockSizeMismatch { .. })
    ));
}
