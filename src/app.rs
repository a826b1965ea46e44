//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - ingests replicate trace tables
//! - runs the two-stage estimation pipeline
//! - prints dataset summaries
//! - writes estimate/residual/sweep CSV exports

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, ResidualsArgs, SimulateArgs};
use crate::domain::{
    CrossvalSettings, Dataset, FittedModel, OuParams, PenMode, RunConfig, Trace, TipParams,
    clip_below_floor,
};
use crate::error::AppError;
use crate::fit::penalty::linear_pen_grid;
use crate::fit::tipping::{TipInit, fit_tipping};
use crate::fit::fit_ou;
use crate::io::export::{write_estimates_csv, write_residuals_csv, write_traces_csv};
use crate::io::ingest::{discover_csv_files, read_traces_csv};
use crate::io::model::{ModelFile, read_model_json, write_model_json};
use crate::sim::generate_ensemble;

pub mod pipeline;

/// Entry point for the `tipfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Sweep(args) => handle_sweep(args),
        Command::Residuals(args) => handle_residuals(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let inputs = resolve_inputs(&args.input)?;
    ensure_out_dir(&args.out)?;

    for path in &inputs {
        let dataset = read_traces_csv(path)?;
        let output = pipeline::run_dataset(&dataset, &config)?;

        print!("{}", crate::report::format_dataset_summary(&output));
        for warning in &output.warnings {
            eprintln!("warning: {warning}");
        }

        let out_path = args.out.join(format!("{}_estimates.csv", dataset.name));
        write_estimates_csv(&out_path, &output.rows, false)?;
        println!("  wrote {}", out_path.display());
    }
    Ok(())
}

fn handle_sweep(args: FitArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let inputs = resolve_inputs(&args.input)?;
    ensure_out_dir(&args.out)?;

    for path in &inputs {
        let dataset = read_traces_csv(path)?;
        let output = pipeline::run_pen_sweep(&dataset, &config)?;

        print!("{}", crate::report::format_dataset_summary(&output));
        for warning in &output.warnings {
            eprintln!("warning: {warning}");
        }

        let out_path = args.out.join(format!("{}_pen_sweep.csv", dataset.name));
        write_estimates_csv(&out_path, &output.rows, true)?;
        println!("  wrote {}", out_path.display());
    }
    Ok(())
}

fn handle_residuals(args: ResidualsArgs) -> Result<(), AppError> {
    let dataset = read_traces_csv(&args.input)?;
    let trace = select_trace(&dataset, args.replicate.as_deref())?;
    ensure_out_dir(&args.out)?;

    let onset = dataset.onset_index(args.t0);
    if onset < 3 || onset >= dataset.times.len() {
        return Err(AppError::new(
            3,
            format!(
                "Dataset '{}': t0 = {} does not split the time axis into usable segments.",
                dataset.name, args.t0
            ),
        ));
    }
    let post = clip_below_floor(&trace.values[onset..], args.post_floor);

    let model = match &args.model {
        Some(path) => read_model_json(path)?.model,
        None => {
            let ou = fit_ou(&trace.values[..onset], dataset.delta)?;
            let init = TipInit {
                tau: args.tau_init,
                a: args.a_init,
            };
            let tip = fit_tipping(post, dataset.delta, &ou.params, args.pen, init)?;
            let model = FittedModel {
                ou: ou.params,
                tip: tip.params,
            };
            if let Some(path) = &args.export_model {
                write_model_json(
                    path,
                    &ModelFile {
                        tool: "tipfit".to_string(),
                        dataset: dataset.name.clone(),
                        replicate: trace.name.clone(),
                        t0: args.t0,
                        delta: dataset.delta,
                        pen: args.pen,
                        model,
                    },
                )?;
                println!("wrote {}", path.display());
            }
            model
        }
    };
    let residuals = crate::report::standardized_residuals(post, dataset.delta, &model)?;

    let out_path = args
        .out
        .join(format!("{}_residuals_{}.csv", dataset.name, trace.name));
    write_residuals_csv(&out_path, &residuals)?;
    println!(
        "{}: {} residuals for replicate {} (tau = {:.2}, a = {:.4})",
        dataset.name,
        residuals.len(),
        trace.name,
        model.tip.tau,
        model.tip.a
    );
    println!("wrote {}", out_path.display());
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    validate_simulate(&args)?;
    let model = FittedModel {
        ou: OuParams {
            alpha0: args.alpha0,
            mu0: args.mu0,
            sigma2: args.sigma2,
        },
        tip: TipParams {
            tau: args.tau,
            a: args.a,
        },
    };

    let ensemble = generate_ensemble(
        &model,
        args.delta,
        args.baseline_obs,
        args.post_obs,
        args.nloop,
        args.seed,
        args.nrep,
    );

    let n_obs = args.baseline_obs + args.post_obs;
    let times: Vec<f64> = (0..n_obs)
        .map(|j| args.t0 + (j as f64 - args.baseline_obs as f64) * args.delta)
        .collect();
    let name = args
        .out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "simulated".to_string());
    let dataset = Dataset {
        name,
        delta: args.delta,
        times,
        traces: ensemble
            .into_iter()
            .enumerate()
            .map(|(i, values)| Trace {
                name: format!("rep{}", i + 1),
                values,
            })
            .collect(),
    };

    write_traces_csv(&args.out, &dataset)?;
    println!(
        "wrote {} ({} replicates, {} observations, tc = {:.2})",
        args.out.display(),
        dataset.traces.len(),
        n_obs,
        model.tc(args.t0)
    );
    Ok(())
}

pub fn run_config_from_args(args: &FitArgs) -> Result<RunConfig, AppError> {
    let pen = if args.calibrate {
        PenMode::Calibrate
    } else {
        let pen = args.pen.unwrap_or(0.0);
        if !(pen.is_finite() && pen >= 0.0) {
            return Err(AppError::new(
                2,
                format!("Invalid pen: {pen} (must be finite and >= 0)."),
            ));
        }
        PenMode::Fixed(pen)
    };
    Ok(RunConfig {
        t0: args.t0,
        post_floor: args.post_floor,
        pen,
        pen_grid: linear_pen_grid(args.pen_max, args.pen_steps)?,
        crossval: CrossvalSettings {
            nsim: args.nsim,
            nloop: args.nloop,
            seed: args.seed,
        },
        tau_init: args.tau_init,
        a_init: args.a_init,
        min_post_obs: args.min_post,
    })
}

fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>, AppError> {
    if input.is_dir() {
        let files = discover_csv_files(input)?;
        if files.is_empty() {
            return Err(AppError::new(
                3,
                format!("No CSV files found in '{}'.", input.display()),
            ));
        }
        Ok(files)
    } else {
        Ok(vec![input.to_path_buf()])
    }
}

fn ensure_out_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))
}

fn select_trace<'a>(dataset: &'a Dataset, name: Option<&str>) -> Result<&'a Trace, AppError> {
    match name {
        Some(name) => dataset
            .traces
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| {
                AppError::new(
                    2,
                    format!("Replicate '{name}' not found in dataset '{}'.", dataset.name),
                )
            }),
        None => dataset.traces.first().ok_or_else(|| {
            AppError::new(3, format!("Dataset '{}' has no replicates.", dataset.name))
        }),
    }
}

fn validate_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let positive = [
        ("alpha0", args.alpha0),
        ("sigma2", args.sigma2),
        ("tau", args.tau),
        ("a", args.a),
        ("delta", args.delta),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(AppError::new(
                2,
                format!("Invalid {name}: {value} (must be finite and > 0)."),
            ));
        }
    }
    if args.baseline_obs < 3 || args.post_obs == 0 {
        return Err(AppError::new(
            2,
            "Simulation needs baseline-obs >= 3 and post-obs >= 1.",
        ));
    }
    if args.nrep == 0 || args.nloop == 0 {
        return Err(AppError::new(2, "Simulation needs nrep > 0 and nloop > 0."));
    }
    Ok(())
}
