use clap::{Args, Parser, Subcommand};
use ghf::dataset::{Dataset, load_dataset};
use ghf::export::{write_performance_table, write_prediction_triples, write_sensitivity_table};
use ghf::greenland::{categorical_covariates, global_load_config, gris_load_config, run_greenland};
use ghf::impute::ImputeOptions;
use ghf::model::{BoostConfig, GradientBoostedTrees};
use ghf::partition::SplitOptions;
use ghf::sweep::{
    CenterSampling, PerformanceSweepConfig, SensitivitySweepConfig, run_performance_sweep,
    run_sensitivity_sweep,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ghf")]
#[command(about = "Geothermal heat flux estimation with spatial cross-validation", long_about = None)]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Average model scores over a (test fraction x radius) grid.
    Performance(PerformanceArgs),
    /// Measure prediction drift under noisy training targets.
    Sensitivity(SensitivityArgs),
    /// Predict GHF under the Greenland ice sheet.
    Greenland(GreenlandArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Global 1-degree covariate/GHF CSV.
    #[arg(long = "global")]
    global: PathBuf,
    /// Greenland regional CSV, merged into the global frame when given.
    #[arg(long = "gris")]
    gris: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Number of boosting rounds.
    #[arg(long = "estimators", default_value_t = 3000)]
    estimators: usize,
    #[arg(long = "learning-rate", default_value_t = 0.05)]
    learning_rate: f64,
    #[arg(long = "max-depth", default_value_t = 4)]
    max_depth: usize,
    /// Seed for row/feature subsampling inside the model.
    #[arg(long = "model-seed", default_value_t = 0)]
    model_seed: u64,
}

impl ModelArgs {
    fn config(&self) -> BoostConfig {
        BoostConfig {
            n_estimators: self.estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            seed: self.model_seed,
            ..BoostConfig::default()
        }
    }
}

#[derive(Args, Debug)]
struct PerformanceArgs {
    #[command(flatten)]
    data: DataArgs,
    #[command(flatten)]
    model: ModelArgs,
    /// Comma-separated test fractions; defaults to 0.10..0.95.
    #[arg(long = "fractions", value_delimiter = ',')]
    fractions: Vec<f64>,
    /// Comma-separated circle radii in kilometers.
    #[arg(long = "radii", value_delimiter = ',')]
    radii: Vec<f64>,
    #[arg(long = "ncenters", default_value_t = 10)]
    ncenters: usize,
    /// Minimum test rows a sampled center must enclose.
    #[arg(long = "min-test-points", default_value_t = 100)]
    min_test_points: usize,
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,
    /// Output table path.
    #[arg(long = "out", default_value = "error_details.txt")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct SensitivityArgs {
    #[command(flatten)]
    data: DataArgs,
    #[command(flatten)]
    model: ModelArgs,
    #[arg(long = "fraction", default_value_t = 0.9)]
    fraction: f64,
    #[arg(long = "radius", default_value_t = 1700.0)]
    radius_km: f64,
    /// Comma-separated relative noise amplitudes; defaults to 0.02..0.24.
    #[arg(long = "amps", value_delimiter = ',')]
    amps: Vec<f64>,
    #[arg(long = "ncenters", default_value_t = 10)]
    ncenters: usize,
    #[arg(long = "min-test-points", default_value_t = 100)]
    min_test_points: usize,
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,
    /// Output table path.
    #[arg(long = "out", default_value = "sensitivity_details.txt")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct GreenlandArgs {
    #[command(flatten)]
    data: DataArgs,
    #[command(flatten)]
    model: ModelArgs,
    /// Fraction of the GRIP circle held out for testing.
    #[arg(long = "test-fraction", default_value_t = 0.3)]
    test_fraction: f64,
    /// Radius of the GRIP test circle in kilometers.
    #[arg(long = "radius", default_value_t = 3500.0)]
    radius_km: f64,
    #[arg(long = "split-seed", default_value_t = 0)]
    split_seed: u64,
    /// Directory the prediction files are written into.
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
}

fn main() {
    env_logger::init();
    log::debug!(
        "ghf build {} ({})",
        env!("GHF_BUILD_TIMESTAMP"),
        option_env!("GHF_RELEASE_TAG").unwrap_or("dev")
    );
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Performance(args) => run_performance(args),
        Command::Sensitivity(args) => run_sensitivity(args),
        Command::Greenland(args) => run_greenland_cmd(args),
    }
}

fn load(data: &DataArgs) -> Result<Dataset, String> {
    let mut cfgs = vec![global_load_config(&data.global)];
    if let Some(gris) = &data.gris {
        cfgs.push(gris_load_config(gris));
    }
    load_dataset(&cfgs, &categorical_covariates()).map_err(|e| e.to_string())
}

/// Keep only measured rows: targets present and not sitting on the
/// prescribed-value sentinel the imputation workflow reserves.
fn labeled_measured(data: &Dataset) -> Dataset {
    let sentinel = ImputeOptions::default().unmeasured_sentinel;
    let keep: Vec<usize> = (0..data.len())
        .filter(|&i| match data.target()[i] {
            Some(v) => sentinel != Some(v),
            None => false,
        })
        .collect();
    data.select(&keep)
}

fn run_performance(args: PerformanceArgs) -> Result<(), String> {
    let data = labeled_measured(&load(&args.data)?);
    let defaults = PerformanceSweepConfig::default();
    let cfg = PerformanceSweepConfig {
        test_fractions: if args.fractions.is_empty() {
            defaults.test_fractions
        } else {
            args.fractions.clone()
        },
        radii_km: if args.radii.is_empty() {
            defaults.radii_km
        } else {
            args.radii.clone()
        },
        ncenters: args.ncenters,
        sampling: CenterSampling {
            min_test_points: args.min_test_points,
            ..CenterSampling::default()
        },
        seed: args.seed,
    };
    let template = GradientBoostedTrees::new(args.model.config()).map_err(|e| e.to_string())?;
    let cells =
        run_performance_sweep(&data, &cfg, || template.clone()).map_err(|e| e.to_string())?;
    for cell in &cells {
        println!(
            "t={:.2} radius={:>6.0} km  r2={:+.3}  rmse={:.3}  ({} centers)",
            cell.test_fraction, cell.radius_km, cell.mean_r2, cell.mean_rmse, cell.centers_used
        );
    }
    write_performance_table(&args.out, &cells).map_err(|e| e.to_string())?;
    println!("wrote {}", args.out.display());
    Ok(())
}

fn run_sensitivity(args: SensitivityArgs) -> Result<(), String> {
    let data = labeled_measured(&load(&args.data)?);
    let defaults = SensitivitySweepConfig::default();
    let cfg = SensitivitySweepConfig {
        test_fraction: args.fraction,
        radius_km: args.radius_km,
        noise_amplitudes: if args.amps.is_empty() {
            defaults.noise_amplitudes
        } else {
            args.amps.clone()
        },
        ncenters: args.ncenters,
        sampling: CenterSampling {
            min_test_points: args.min_test_points,
            ..CenterSampling::default()
        },
        seed: args.seed,
    };
    let template = GradientBoostedTrees::new(args.model.config()).map_err(|e| e.to_string())?;
    let cells =
        run_sensitivity_sweep(&data, &cfg, || template.clone()).map_err(|e| e.to_string())?;
    for cell in &cells {
        println!(
            "noise={:.2}  normalized rmse={:.4}  ({} centers)",
            cell.noise_amplitude, cell.mean_normalized_rmse, cell.centers_used
        );
    }
    write_sensitivity_table(&args.out, &cells).map_err(|e| e.to_string())?;
    println!("wrote {}", args.out.display());
    Ok(())
}

fn run_greenland_cmd(args: GreenlandArgs) -> Result<(), String> {
    let data = load(&args.data)?;
    let split_opts = SplitOptions {
        test_fraction: args.test_fraction,
        max_dist_km: args.radius_km,
        seed: args.split_seed,
    };
    let mut model = GradientBoostedTrees::new(args.model.config()).map_err(|e| e.to_string())?;
    let run = run_greenland(&data, &mut model, &split_opts, &ImputeOptions::default())
        .map_err(|e| e.to_string())?;

    println!(
        "held-out circle: r2={:+.3}, rmse={:.3} over {} test rows",
        run.summary.r2,
        run.summary.rmse,
        run.test_points.len()
    );
    println!("predicted {} unmeasured rows", run.unknown_points.len());

    let unknown_path = args.out_dir.join("lat_lon_ghf.txt");
    write_prediction_triples(&unknown_path, &run.unknown_points, run.unknown_predicted.view())
        .map_err(|e| e.to_string())?;
    let test_path = args.out_dir.join("greenland_test_ghf.txt");
    write_prediction_triples(&test_path, &run.test_points, run.test_predicted.view())
        .map_err(|e| e.to_string())?;
    println!("wrote {} and {}", unknown_path.display(), test_path.display());
    Ok(())
}
