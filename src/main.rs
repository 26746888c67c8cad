//! # rusty-isotherm
//!
//! Command-line front end for the per-material isotherm aggregation engine.
//!
//! ```bash
//! # Summarise a dataset
//! rusty-isotherm info isotherms.parquet
//!
//! # Aggregate CO2 against N2 around 298 K
//! rusty-isotherm compare isotherms.parquet --g1 "carbon dioxide" --g2 nitrogen -t 298
//!
//! # Separation metrics at 1 bar, working capacity 0.5 to 10 bar
//! rusty-isotherm kpi isotherms.parquet --pressure 1 --range 0.5 10 --format json
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rusty_isotherm::aggregate::compare;
use rusty_isotherm::config::Config;
use rusty_isotherm::data::model::{ColumnKind, ObservationTable, TypeSelector};
use rusty_isotherm::data::loader::load_file;
use rusty_isotherm::export::{self, Format};
use rusty_isotherm::kpi::{self, KpiParams};
use rusty_isotherm::stats::{CenterStatistic, OutlierPolicy, ReducerConfig};
use rusty_isotherm::{ComparisonTable, SelectionParams};

/// rusty-isotherm - per-material adsorption isotherm comparison
#[derive(Parser)]
#[command(name = "rusty-isotherm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a dataset
    Info {
        /// Dataset path (.parquet, .json or .csv)
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,
    },

    /// Aggregate two adsorbates per material and print the comparison table
    Compare {
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Compute selectivity, uptake, working capacity and PSA-API per material
    Kpi {
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Uptake pressure in bar
        #[arg(short, long)]
        pressure: Option<f64>,

        /// Working-capacity pressure range in bar
        #[arg(long, num_args = 2, value_names = ["P1", "P2"])]
        range: Option<Vec<f64>>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// First adsorbate
    #[arg(long)]
    g1: Option<String>,

    /// Second adsorbate
    #[arg(long)]
    g2: Option<String>,

    /// Temperature center in K
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Temperature tolerance in K
    #[arg(long)]
    tolerance: Option<f64>,

    /// Measurement types to include (all, experimental, simulated)
    #[arg(long = "type", value_name = "TYPE")]
    measurement_type: Option<TypeSelector>,

    /// Outlier handling (retain-outliers, discard-outliers)
    #[arg(long, value_parser = parse_policy)]
    policy: Option<OutlierPolicy>,

    /// Center statistic (median, mean)
    #[arg(long, value_parser = parse_center)]
    center: Option<CenterStatistic>,
}

#[derive(Args)]
struct OutputArgs {
    /// Output format (csv, json)
    #[arg(short, long, default_value = "csv")]
    format: Format,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn parse_policy(s: &str) -> std::result::Result<OutlierPolicy, String> {
    match s {
        "retain-outliers" | "retain" => Ok(OutlierPolicy::RetainOutliers),
        "discard-outliers" | "discard" => Ok(OutlierPolicy::DiscardOutliers),
        other => Err(format!("unknown outlier policy '{other}'")),
    }
}

fn parse_center(s: &str) -> std::result::Result<CenterStatistic, String> {
    match s {
        "median" => Ok(CenterStatistic::Median),
        "mean" => Ok(CenterStatistic::Mean),
        other => Err(format!("unknown center statistic '{other}'")),
    }
}

impl SelectionArgs {
    /// Flags override the config file.
    fn resolve(&self, config: &Config) -> (SelectionParams, ReducerConfig) {
        let mut params = config.selection_params();
        if let Some(g1) = &self.g1 {
            params.adsorbate_x = g1.clone();
        }
        if let Some(g2) = &self.g2 {
            params.adsorbate_y = g2.clone();
        }
        if let Some(t) = self.temperature {
            params.filter.temperature = t;
        }
        if let Some(tol) = self.tolerance {
            params.filter.tolerance = tol;
        }
        if let Some(kind) = self.measurement_type {
            params.filter.measurement_type = kind;
        }

        let mut reducer = config.reducer_config();
        if let Some(policy) = self.policy {
            reducer.outlier_policy = policy;
        }
        if let Some(center) = self.center {
            reducer.center = center;
        }
        (params, reducer)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Info { dataset } => run_info(&dataset, &config),
        Commands::Compare {
            dataset,
            selection,
            output,
        } => run_compare(&dataset, &config, &selection, &output),
        Commands::Kpi {
            dataset,
            selection,
            pressure,
            range,
            output,
        } => run_kpi(&dataset, &config, &selection, pressure, range, &output),
    }
}

fn load(dataset: &Path, config: &Config) -> Result<ObservationTable> {
    if !dataset.exists() {
        anyhow::bail!("Dataset does not exist: {}", dataset.display());
    }
    load_file(dataset, &config.load_options())
}

fn open_output(output: &OutputArgs) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match &output.output {
        Some(path) => {
            info!("Writing {} to {}", output.format, path.display());
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };
    Ok(writer)
}

fn run_info(dataset: &Path, config: &Config) -> Result<()> {
    let table = load(dataset, config)?;

    println!("Dataset: {}", dataset.display());
    println!("  Observations: {}", table.len());
    println!("  Materials:    {}", table.materials().len());
    println!("  Adsorbates:   {}", table.adsorbates().join(", "));
    println!("  Columns:");
    for col in table.schema().columns() {
        let kind = match col.kind {
            ColumnKind::Henry => "Henry's constant (ln kH)".to_string(),
            ColumnKind::Loading { pressure } => format!("loading at {pressure} bar"),
            ColumnKind::Other => "numeric".to_string(),
        };
        println!("    {:<16} {}", col.name, kind);
    }
    Ok(())
}

fn comparison(
    dataset: &Path,
    config: &Config,
    selection: &SelectionArgs,
) -> Result<ComparisonTable> {
    let table = load(dataset, config)?;
    let (params, reducer) = selection.resolve(config);
    info!(
        "Comparing {} vs {} at {} ± {} K ({:?})",
        params.adsorbate_x,
        params.adsorbate_y,
        params.filter.temperature,
        params.filter.tolerance,
        params.filter.measurement_type
    );

    let comparison = compare(&table, &params, &reducer).context("Aggregation failed")?;
    let diagnostics = comparison.diagnostics();
    if !diagnostics.only_x.is_empty() {
        warn!(
            "{} materials only have {} data: {}",
            diagnostics.only_x.len(),
            params.adsorbate_x,
            diagnostics.only_x.join(", ")
        );
    }
    if !diagnostics.only_y.is_empty() {
        warn!(
            "{} materials only have {} data: {}",
            diagnostics.only_y.len(),
            params.adsorbate_y,
            diagnostics.only_y.join(", ")
        );
    }
    info!("{} materials in comparison", comparison.len());
    Ok(comparison)
}

fn run_compare(
    dataset: &Path,
    config: &Config,
    selection: &SelectionArgs,
    output: &OutputArgs,
) -> Result<()> {
    let table = comparison(dataset, config, selection)?;
    let writer = open_output(output)?;
    export::write_comparison(&table, output.format, writer)
}

fn run_kpi(
    dataset: &Path,
    config: &Config,
    selection: &SelectionArgs,
    pressure: Option<f64>,
    range: Option<Vec<f64>>,
    output: &OutputArgs,
) -> Result<()> {
    let mut params: KpiParams = config.kpi_params();
    if let Some(p) = pressure {
        params.uptake_pressure = p;
    }
    if let Some([p1, p2]) = range.as_deref() {
        params.working_range = (*p1, *p2);
    }

    let table = comparison(dataset, config, selection)?;
    if let Some(limit) = kpi::pressure_limit(&table) {
        info!("Both adsorbates have loadings up to {limit} bar");
    }
    let kpis = kpi::compute(&table, &params).context("KPI computation failed")?;
    let writer = open_output(output)?;
    export::write_kpis(&kpis, output.format, writer)
}
