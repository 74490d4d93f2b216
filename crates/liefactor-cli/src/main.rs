use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use liefactor_optim::{ProblemDescription, SolveReport, SolverOptions};
use log::info;

/// Solve a JSON-described manifold least-squares problem.
#[derive(Debug, Parser)]
#[command(author, version, about = "Manifold-aware nonlinear least squares")]
struct Args {
    /// Path to JSON file containing a ProblemDescription.
    #[arg(long)]
    input: String,

    /// Optional path to JSON SolverOptions. Overrides options embedded in the input.
    #[arg(long)]
    options: Option<String>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<String>,

    /// Log every iteration.
    #[arg(long, short)]
    verbose: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn solve_from_files(
    input_path: &str,
    options_path: Option<&str>,
    verbose: bool,
) -> Result<SolveReport> {
    let problem: ProblemDescription = load_json_file(Path::new(input_path))?;

    let mut options = match options_path {
        Some(path) => load_json_file::<SolverOptions>(Path::new(path))?,
        None => problem.options.clone().unwrap_or_default(),
    };
    options.verbose |= verbose;

    info!(
        "loaded {} parameter blocks and {} residuals from {input_path}",
        problem.parameters.len(),
        problem.residuals.len()
    );
    let report = problem.solve(Some(&options))?;
    Ok(report)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let report = solve_from_files(&args.input, args.options.as_deref(), args.verbose)?;
    let json = report.to_json_pretty()?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("writing {path}"))?,
        None => println!("{json}"),
    }
    if !report.summary.termination_status.is_usable() {
        anyhow::bail!("solver failed: {}", report.summary.message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use liefactor_core::{LieGroup, ManifoldKind, Se2, Vec3};
    use liefactor_optim::description::{
        FactorDescription, NoiseDescription, ParameterDescription, ResidualDescription,
    };
    use liefactor_optim::TerminationStatus;
    use tempfile::NamedTempFile;

    fn write_json<T: serde::Serialize>(value: &T, path: &Path) {
        serde_json::to_writer_pretty(fs::File::create(path).unwrap(), value).unwrap();
    }

    /// Consistent SE(2) chain with a perturbed, constant first pose.
    fn pose_chain() -> ProblemDescription {
        let truth: Vec<Se2> = (0..4)
            .map(|i| Se2::from_xy_theta(i as f64, 0.5 * i as f64, 0.2 * i as f64))
            .collect();
        let parameters = truth
            .iter()
            .enumerate()
            .map(|(i, t)| ParameterDescription {
                name: format!("x{i}"),
                manifold: ManifoldKind::SE2,
                values: t.plus(&Vec3::new(0.1, -0.1, 0.05)).to_array(),
                constant: i == 0,
            })
            .collect();
        let residuals = truth
            .windows(2)
            .enumerate()
            .map(|(i, w)| ResidualDescription {
                factor: FactorDescription::Relative {
                    manifold: ManifoldKind::SE2,
                    measured: (w[0].inverse() * w[1]).to_array(),
                    noise: Some(NoiseDescription::Sigmas(vec![0.1, 0.1, 0.05])),
                    from: format!("x{i}"),
                    to: format!("x{}", i + 1),
                },
                loss: Default::default(),
            })
            .collect();
        ProblemDescription {
            parameters,
            residuals,
            options: None,
        }
    }

    #[test]
    fn helper_smoke_test() {
        let problem = pose_chain();
        let input_file = NamedTempFile::new().unwrap();
        let options_file = NamedTempFile::new().unwrap();
        write_json(&problem, input_file.path());
        write_json(
            &SolverOptions {
                max_num_iterations: 100,
                ..SolverOptions::default()
            },
            options_file.path(),
        );

        let report = solve_from_files(
            input_file.path().to_str().unwrap(),
            Some(options_file.path().to_str().unwrap()),
            false,
        )
        .expect("cli helper should succeed");
        assert!(report.summary.is_converged(), "{}", report.summary);
        assert!(
            report.summary.final_cost < 1e-12,
            "final cost too high: {}",
            report.summary.final_cost
        );

        let json = report.to_json_pretty().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["summary"]["termination_status"], "converged");
        let x0: Vec<f64> = serde_json::from_value(parsed["parameters"]["x0"].clone()).unwrap();
        assert_eq!(parsed["parameters"].as_object().unwrap().len(), 4);
        for (a, b) in x0.iter().zip(&problem.parameters[0].values) {
            assert!((a - b).abs() < 1e-12, "constant block moved: {a} vs {b}");
        }
    }

    #[test]
    fn embedded_options_are_used_without_options_file() {
        let mut problem = pose_chain();
        problem.options = Some(SolverOptions {
            max_num_iterations: 1,
            ..SolverOptions::default()
        });
        let input_file = NamedTempFile::new().unwrap();
        write_json(&problem, input_file.path());

        let report = solve_from_files(input_file.path().to_str().unwrap(), None, true).unwrap();
        assert_eq!(report.summary.iterations_used, 1);
        assert_eq!(report.summary.termination_status, TerminationStatus::NoConvergence);
    }

    #[test]
    fn malformed_input_reports_path() {
        let input_file = NamedTempFile::new().unwrap();
        fs::write(input_file.path(), "{ not json").unwrap();
        let err = solve_from_files(input_file.path().to_str().unwrap(), None, false).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }
}
