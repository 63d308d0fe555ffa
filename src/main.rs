//! Command-line interface for misuse-rs
//!
//! Binds the detection core to the external collaborators: the trace
//! extractor producing feature files, the documentation miner producing
//! `doc_feature.json`, and the filesystem layout both share.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use console::style;
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use misuse_rs::{corpus, detect, doc::DocStore, driver, CheckKind, DetectConfig, Detector};
use std::path::PathBuf;
use std::time::Instant;

/// Frequency-based API-misuse detection from symbolic trace features
#[derive(Parser, Debug)]
#[command(
    name = "misuse-rs",
    version,
    author,
    about = "A Rust tool for inferring API usage specifications from symbolic traces and detecting misuse bugs",
    long_about = None
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "misuse-rs.toml")]
    config: PathBuf,

    /// Set verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect API misuse bugs from extracted trace features
    Detect {
        /// Directory of per-function trace features (default: <outdir>/features)
        #[arg(long, value_name = "PATH")]
        feature_dir: Option<PathBuf>,

        /// Directory holding doc_feature.json
        #[arg(long, value_name = "PATH")]
        doc_dir: Option<PathBuf>,

        /// Directory where to save output (default: ./cad-output)
        #[arg(long, value_name = "PATH")]
        outdir: Option<PathBuf>,

        /// Target function to detect
        #[arg(long = "target-fn", value_name = "NAME")]
        target_fn: Option<String>,

        /// Run a single check kind instead of all four
        #[arg(long = "type", value_enum, value_name = "KIND")]
        check_type: Option<CheckType>,

        /// Threshold of the frequency-based specification, in (0, 1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Midpoint of the logistic threshold curve
        #[arg(long)]
        rho: Option<u32>,

        /// Count the same feature at a location only once
        #[arg(long = "rm-dup")]
        rm_dup: bool,

        /// Consult documentation features as secondary evidence
        #[arg(long)]
        enable_doc: bool,

        /// Only use documentation features
        #[arg(long)]
        disable_code: bool,

        /// Print inferred specifications while detecting
        #[arg(long)]
        display_spec: bool,

        /// Emit one line per offending location
        #[arg(long)]
        only_report_locations: bool,
    },

    /// Roll per-bitcode occurrence maps up into total counts, or query them
    Occurrence {
        /// Directory where to save/load output (default: ./cad-output)
        #[arg(long, value_name = "PATH")]
        outdir: Option<PathBuf>,

        /// Query the rolled-up counts for functions containing this name
        #[arg(long, value_name = "NAME")]
        target: Option<String>,

        /// Only list functions occurring more than this many times
        #[arg(long = "min-num", default_value = "0")]
        min_num: u64,
    },

    /// Fan the external extractor out over bitcode files
    Extract {
        /// Directory holding .bc files
        #[arg(long, value_name = "PATH")]
        bcdir: PathBuf,

        /// Directory where to save output (default: ./cad-output)
        #[arg(long, value_name = "PATH")]
        outdir: Option<PathBuf>,

        /// Path to the extractor binary
        #[arg(long, value_name = "FILE", default_value = "target/release/analyzer")]
        extractor: PathBuf,

        /// Extra arguments passed through to every extractor invocation
        #[arg(last = true)]
        extractor_args: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CheckType {
    /// Return-value checking
    #[value(name = "retval")]
    Retval,
    /// Argument preconditions
    #[value(name = "arg.pre")]
    ArgPre,
    /// Argument postconditions
    #[value(name = "arg.post")]
    ArgPost,
    /// Required neighboring calls
    #[value(name = "causality")]
    Causality,
}

impl From<CheckType> for CheckKind {
    fn from(kind: CheckType) -> Self {
        match kind {
            CheckType::Retval => CheckKind::Retval,
            CheckType::ArgPre => CheckKind::ArgPre,
            CheckType::ArgPost => CheckKind::ArgPost,
            CheckType::Causality => CheckKind::Causality,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Detect {
            feature_dir,
            doc_dir,
            outdir,
            target_fn,
            check_type,
            threshold,
            rho,
            rm_dup,
            enable_doc,
            disable_code,
            display_spec,
            only_report_locations,
        } => {
            let mut config = load_or_default_config(&cli.config)?;
            // CLI flags override file values.
            config.feature_dir = feature_dir.or(config.feature_dir);
            config.doc_dir = doc_dir.or(config.doc_dir);
            config.outdir = outdir.or(config.outdir);
            config.target_fn = target_fn.or(config.target_fn);
            config.check_kind = check_type.map(CheckKind::from).or(config.check_kind);
            config.threshold = threshold.or(config.threshold);
            config.rho = rho.or(config.rho);
            config.remove_dup |= rm_dup;
            config.enable_doc |= enable_doc;
            config.disable_code |= disable_code;
            config.display_spec |= display_spec;
            config.only_report_locations |= only_report_locations;
            handle_detect(config)
        }
        Commands::Occurrence {
            outdir,
            target,
            min_num,
        } => handle_occurrence(outdir, target, min_num),
        Commands::Extract {
            bcdir,
            outdir,
            extractor,
            extractor_args,
        } => handle_extract(bcdir, outdir, extractor, extractor_args),
    }
}

/// Initialize the logger based on verbosity settings
fn init_logger(verbosity: u8, quiet: bool) {
    let mut builder = Builder::from_default_env();

    if quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else {
        let level = match verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        builder.filter_level(level);
    }

    builder
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}

/// Load configuration from file or fall back to defaults
fn load_or_default_config(path: &PathBuf) -> Result<DetectConfig> {
    if path.exists() {
        DetectConfig::from_file(path).context("Failed to load configuration")
    } else {
        Ok(DetectConfig::default())
    }
}

/// Handle the detect command
fn handle_detect(config: DetectConfig) -> Result<()> {
    let start = Instant::now();
    let outdir = config.resolved_outdir();
    std::fs::create_dir_all(&outdir)
        .with_context(|| format!("Failed to create {}", outdir.display()))?;
    let feature_dir = config.resolved_feature_dir();

    let traces = corpus::feature_files(&feature_dir, config.target_fn.as_deref())
        .with_context(|| format!("Failed to read features from {}", feature_dir.display()))?;
    info!("Detecting for {} functions", traces.len());

    let doc_store = if config.enable_doc || config.disable_code {
        load_doc_store(&config)
    } else {
        None
    };

    println!("{}", style("misuse-rs - API Misuse Detection").bold());
    println!();
    println!("Feature dir:  {}", feature_dir.display());
    println!("Output dir:   {}", outdir.display());
    println!();

    let progress = ProgressBar::new(traces.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let only_report_locations = config.only_report_locations;
    let mut detector = Detector::new(config, doc_store);
    for (func_name, paths) in &traces {
        progress.set_message(func_name.clone());
        detector.detect_function(func_name, paths);
        progress.inc(1);
    }
    progress.finish_with_message(format!("{}", "detection complete".green()));

    let reports = detector.into_reports();
    let report_path = outdir.join("bugreport.txt");
    let total = detect::report::write(&report_path, &reports, only_report_locations)
        .context("Failed to write the bug report")?;

    println!();
    println!("  Functions:     {}", traces.len());
    println!("  Reports:       {total}");
    println!("  Elapsed time:  {:.2}s", start.elapsed().as_secs_f64());
    println!();
    println!(
        "{} {}",
        style("Dumped results to").dim(),
        report_path.display()
    );

    Ok(())
}

/// Load the documentation store, treating a missing or broken file as
/// empty evidence.
fn load_doc_store(config: &DetectConfig) -> Option<DocStore> {
    let doc_dir = config
        .doc_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("doc_features"));
    let doc_path = doc_dir.join("doc_feature.json");
    match DocStore::load(&doc_path) {
        Ok(store) => {
            info!("loaded doc features for {} functions", store.len());
            Some(store)
        }
        Err(err) => {
            warn!("can not load {}: {err}", doc_path.display());
            None
        }
    }
}

/// Handle the occurrence command
fn handle_occurrence(outdir: Option<PathBuf>, target: Option<String>, min_num: u64) -> Result<()> {
    let outdir = outdir.unwrap_or_else(|| PathBuf::from("cad-output"));
    match target {
        None => {
            let totals = corpus::summarize_occurrences(&outdir)
                .context("Failed to read occurrence maps")?;
            let path = corpus::write_occurrence_summary(&outdir, &totals)
                .context("Failed to write the occurrence summary")?;
            println!(
                "{} {} functions -> {}",
                style("Summarized").green(),
                totals.len(),
                path.display()
            );
        }
        Some(target) => {
            let totals = corpus::read_occurrence_summary(&outdir)
                .context("Failed to read the occurrence summary")?;
            let mut found = false;
            for (func, count) in &totals {
                if !func.contains(&target) {
                    continue;
                }
                found = true;
                if *count > min_num {
                    println!("the occurrences time of {func} is: {count}");
                }
            }
            if !found {
                println!("Cannot find {target} in the occurrence summary");
            }
        }
    }
    Ok(())
}

/// Handle the extract command
fn handle_extract(
    bcdir: PathBuf,
    outdir: Option<PathBuf>,
    extractor: PathBuf,
    extractor_args: Vec<String>,
) -> Result<()> {
    let outdir = outdir.unwrap_or_else(|| PathBuf::from("cad-output"));
    std::fs::create_dir_all(&outdir)
        .with_context(|| format!("Failed to create {}", outdir.display()))?;

    let bc_files = driver::bc_files(&bcdir);
    if bc_files.is_empty() {
        println!("{} no .bc files in {}", style("warning:").yellow(), bcdir.display());
        return Ok(());
    }

    println!("{}", style("=== Starting to extract ===").bold());
    let progress = ProgressBar::new(bc_files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let extractor_driver = driver::ExtractorDriver::new(extractor, outdir, extractor_args);
    let target_map = extractor_driver
        .run_all(&bc_files, |bc_file| {
            progress.set_message(
                bc_file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            progress.inc(1);
        })
        .context("Failed to build the extraction work list")?;
    progress.finish_with_message(format!("{}", "extraction complete".green()));

    println!(
        "  {} functions worth extracting features for",
        target_map.functions.len()
    );
    Ok(())
}
