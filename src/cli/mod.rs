//! Command-line interface for radar feature extraction and diagnostics.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{MalformedPolicy, ScalingMethod, SourceErrorPolicy};
use crate::core::stats::{empirical_cdf, fit_beta, ks_test, mean_variance, moment_match, BetaParams};
use crate::processors::diagnostics::{generate_timestamp, ClassificationResult, DiagnosticsExporter};
use crate::processors::pipeline::run_pipeline;
use crate::visualization::{PlotKind, PlotRenderer};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "radar-extract")]
#[command(about = "Radar feature extraction and classifier diagnostics", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, scale and export records from raw radar text files
    Extract {
        /// Root of the raw data tree
        input_root: PathBuf,
        /// Directory for per-source and merged CSV files
        output_dir: PathBuf,
        /// Substring that marks a source directory
        #[arg(long)]
        marker: Option<String>,
        /// Match the marker against the directory name only, not its path
        #[arg(long)]
        leaf_only: bool,
        /// Extension of data files inside a source directory
        #[arg(long)]
        extension: Option<String>,
        /// Header lines skipped at the top of each file
        #[arg(long)]
        header_lines: Option<usize>,
        /// Columns to scale (all numeric columns when omitted)
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        columns: Vec<usize>,
        /// Feature scaling method
        #[arg(long, value_enum)]
        scaler: Option<ScalingMethod>,
        /// What to do with malformed lines
        #[arg(long, value_enum)]
        malformed: Option<MalformedPolicy>,
        /// Leave out sources that fail to load instead of aborting
        #[arg(long)]
        skip_failed_sources: bool,
    },

    /// Export centroid maps, classification boards and APRF metrics
    Diagnostics {
        /// Classification result (YAML, or JSON by extension)
        result: PathBuf,
        /// Root of the diagnostics log tree
        #[arg(long)]
        log_root: Option<PathBuf>,
        /// Run timestamp (generated when neither given nor stored in the result)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Render a diagnostic chart from a file of values
    Plot {
        /// Chart kind
        #[arg(value_enum)]
        kind: PlotKind,
        /// CSV or whitespace-free file of numeric values
        values: PathBuf,
        /// Rest-class distances for one-against-rest charts
        #[arg(long)]
        rest: Option<PathBuf>,
        /// Label used in the file name and title
        #[arg(short, long)]
        label: String,
        /// Beta alpha (fitted from the values when omitted)
        #[arg(long, requires = "beta")]
        alpha: Option<f64>,
        /// Beta beta (fitted from the values when omitted)
        #[arg(long, requires = "alpha")]
        beta: Option<f64>,
        /// Root directory for chart output
        #[arg(short, long)]
        output_root: Option<PathBuf>,
    },

    /// Fit a beta distribution to values in [0, 1] and test the fit
    FitBeta {
        /// File of numeric values
        values: PathBuf,
        /// Label used in the file name and title
        #[arg(short, long)]
        label: String,
        /// Root directory for chart output
        #[arg(short, long)]
        output_root: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Read every numeric field of a comma-separated file, row by row.
///
/// Empty fields are ignored; anything else that is not a number is an error.
pub fn read_values(path: &Path) -> Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        for field in record.iter().filter(|f| !f.is_empty()) {
            let v: f64 = field.parse().with_context(|| {
                format!("{}:{}: not a number: '{}'", path.display(), line + 1, field)
            })?;
            values.push(v);
        }
    }
    Ok(values)
}

fn exit_on_error<T>(spinner: Option<&ProgressBar>, what: &str, result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            error!("{} failed: {:#}", what, e);
            std::process::exit(1);
        }
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Extract {
            input_root,
            output_dir,
            marker,
            leaf_only,
            extension,
            header_lines,
            columns,
            scaler,
            malformed,
            skip_failed_sources,
        } => {
            let mut config = config;
            let extract = &mut config.extract;
            if let Some(m) = marker {
                extract.marker = m;
            }
            if leaf_only {
                extract.match_full_path = false;
            }
            if let Some(ext) = extension {
                extract.file_extension = ext;
            }
            if let Some(n) = header_lines {
                extract.header_lines = n;
            }
            if let Some(p) = malformed {
                extract.malformed = p;
            }
            if skip_failed_sources {
                extract.on_source_error = SourceErrorPolicy::Skip;
            }
            if let Some(method) = scaler {
                config.scaling.method = method;
            }
            if !columns.is_empty() {
                config.scaling.columns = columns;
            }
            cmd_extract(&input_root, &output_dir, &config);
        }
        Commands::Diagnostics { result, log_root, timestamp } => {
            cmd_diagnostics(&result, log_root, timestamp, &config);
        }
        Commands::Plot { kind, values, rest, label, alpha, beta, output_root } => {
            let params = alpha.zip(beta);
            cmd_plot(kind, &values, rest.as_deref(), &label, params, output_root, &config);
        }
        Commands::FitBeta { values, label, output_root } => {
            cmd_fit_beta(&values, &label, output_root, &config);
        }
    }
}

fn cmd_extract(input_root: &Path, output_dir: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Extracting radar records...");
    println!("Input root: {}", input_root.display());
    println!("Output directory: {}", output_dir.display());
    println!("Marker: {}", config.extract.marker);

    let spinner = create_spinner("Reading, scaling and exporting sources...");
    let summary = exit_on_error(
        Some(&spinner),
        "Extraction",
        run_pipeline(input_root, output_dir, config),
    );
    spinner.finish_and_clear();

    let scaled: Vec<String> = summary.fits.iter().map(|f| f.column.to_string()).collect();

    print_summary(
        "Extraction Complete",
        &[
            ("Input root", input_root.display().to_string()),
            ("Sources", summary.sources.to_string()),
            ("Records", summary.records.to_string()),
            ("Scaling", format!("{:?}", config.scaling.method)),
            ("Scaled columns", scaled.join(",")),
            ("Merged file", summary.export.merged_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_diagnostics(
    result_path: &Path,
    log_root: Option<PathBuf>,
    timestamp: Option<String>,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let log_root = log_root.unwrap_or_else(|| config.diagnostics.log_root.clone());

    let mut result = exit_on_error(
        None,
        "Loading classification result",
        ClassificationResult::from_path(result_path).map_err(anyhow::Error::from),
    );

    if let Some(ts) = timestamp {
        result.timestamp = ts;
    } else if result.timestamp.is_empty() {
        result.timestamp = generate_timestamp(&config.diagnostics.timestamp_format);
        info!("Generated timestamp {}", result.timestamp);
    }

    let spinner = create_spinner("Writing diagnostics tables...");
    let summary = exit_on_error(
        Some(&spinner),
        "Diagnostics export",
        DiagnosticsExporter::new(&log_root, &result)
            .and_then(|exporter| exporter.export_all().map(|s| (exporter.log_dir().to_path_buf(), s)))
            .map_err(anyhow::Error::from),
    );
    spinner.finish_and_clear();
    let (log_dir, summary) = summary;

    print_summary(
        "Diagnostics Complete",
        &[
            ("Source tag", result.source_tag.clone()),
            ("Timestamp", result.timestamp.clone()),
            ("Log directory", log_dir.display().to_string()),
            ("Centroid maps", summary.centroid_maps.len().to_string()),
            ("Boards", summary.classification_boards.len().to_string()),
            ("APRF file", summary.aprf.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn beta_params(values: &[f64], given: Option<(f64, f64)>) -> Result<BetaParams> {
    match given {
        Some((alpha, beta)) => Ok(BetaParams::new(alpha, beta)?),
        None => {
            let (mean, var) = mean_variance(values)?;
            Ok(moment_match(mean, var)?)
        }
    }
}

fn render_plot(
    renderer: &PlotRenderer,
    kind: PlotKind,
    values: &[f64],
    rest: Option<&Path>,
    label: &str,
    given: Option<(f64, f64)>,
    bins: usize,
) -> Result<PathBuf> {
    let path = match kind {
        PlotKind::Pdf => renderer.plot_pdf(values, label)?,
        PlotKind::Cdf => renderer.plot_cdf(values, label)?,
        PlotKind::BetaPdf => renderer.plot_beta_pdf(&beta_params(values, given)?, label)?,
        PlotKind::BetaCdf => renderer.plot_beta_cdf(&beta_params(values, given)?, label)?,
        PlotKind::Ks => {
            let params = beta_params(values, given)?;
            let ecdf = empirical_cdf(values, bins)?;
            let xaxis: Vec<f64> = (1..=bins).map(|i| i as f64 / bins as f64).collect();
            let model: Vec<f64> = xaxis.iter().map(|&x| params.cdf(x)).collect();
            let ks = ks_test(&ecdf, &model)?;
            renderer.plot_ks_test(&xaxis, &ecdf, &model, &params, ks.p_value, label)?
        }
        PlotKind::Oar => {
            let Some(rest) = rest else {
                bail!("one-against-rest charts need --rest");
            };
            let rest_values = read_values(rest)?;
            renderer.plot_one_against_rest(label, values, &rest_values)?
        }
    };
    Ok(path)
}

fn cmd_plot(
    kind: PlotKind,
    values_path: &Path,
    rest: Option<&Path>,
    label: &str,
    given: Option<(f64, f64)>,
    output_root: Option<PathBuf>,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    let mut renderer = PlotRenderer::new(&config.plots);
    if let Some(root) = output_root {
        renderer = renderer.with_root(root);
    }

    let values = exit_on_error(None, "Reading values", read_values(values_path));

    let spinner = create_spinner("Rendering chart...");
    let path = exit_on_error(
        Some(&spinner),
        "Plot",
        render_plot(&renderer, kind, &values, rest, label, given, config.plots.beta_bins),
    );
    spinner.finish_and_clear();

    print_summary(
        "Plot Complete",
        &[
            ("Kind", kind.prefix().to_string()),
            ("Values", values.len().to_string()),
            ("Output PNG", path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_fit_beta(values_path: &Path, label: &str, output_root: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();

    let mut renderer = PlotRenderer::new(&config.plots);
    if let Some(root) = output_root {
        renderer = renderer.with_root(root);
    }

    let values = exit_on_error(None, "Reading values", read_values(values_path));
    let fit = exit_on_error(
        None,
        "Beta fit",
        fit_beta(&values, config.plots.beta_bins).context("Failed to fit beta distribution"),
    );

    let path = exit_on_error(
        None,
        "KS plot",
        renderer
            .plot_ks_test(&fit.xaxis, &fit.ecdf, &fit.model_cdf, &fit.params, fit.ks.p_value, label)
            .map_err(anyhow::Error::from),
    );

    print_summary(
        "Beta Fit Complete",
        &[
            ("Samples", values.len().to_string()),
            ("alpha", format!("{:.6}", fit.params.alpha)),
            ("beta", format!("{:.6}", fit.params.beta)),
            ("KS statistic", format!("{:.6}", fit.ks.d)),
            ("p-value", format!("{:.6}", fit.ks.p_value)),
            ("Output PNG", path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}
