mod align;
mod cli;
mod config;
mod driver;
mod error;
mod ffmpeg;
mod filters;
mod model;
mod plot;
mod probe;
mod reconcile;
mod report;
mod session;

use crate::cli::CliArgs;
use crate::config::ToolConfig;
use crate::driver::{BatchOutcome, ComparisonOutcome, Driver, DriverOptions};
use crate::error::Result;
use crate::ffmpeg::FfmpegTools;
use chrono::Local;
use log::{LevelFilter, error, info};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();
    let args = cli::parse_args();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting autovmaf...");
    info!("Arguments: {:?}", args);

    match run(&args) {
        Ok(outcome) => {
            let duration = start_time.elapsed();
            if !outcome.is_success() {
                error!(
                    "{} of {} comparison(s) failed after {:.2?}",
                    outcome.failed.len(),
                    outcome.failed.len() + outcome.completed.len(),
                    duration
                );
                for (path, e) in &outcome.failed {
                    eprintln!("Error: {}: {}", path.display(), e);
                }
                ExitCode::FAILURE
            } else if args.sync_only {
                info!("Sync-only run finished in {:.2?}", duration);
                ExitCode::FAILURE
            } else {
                info!("Analysis completed successfully in {:.2?}", duration);
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            let duration = start_time.elapsed();
            error!("Analysis failed after {:.2?}: {}", duration, e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up logging to console and optionally to a file.
fn setup_logging(args: &CliArgs) -> std::result::Result<(), fern::InitError> {
    let crate_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("autovmaf", crate_level);

    let console_config = fern::Dispatch::new().chain(std::io::stdout());
    let mut logger = base_config.chain(console_config);

    let mut log_path = None;
    if args.log {
        let log_filename = format!("autovmaf_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = args
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(log_filename);
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        logger = logger.chain(fern::Dispatch::new().chain(fern::log_file(&path)?));
        log_path = Some(path);
    }

    logger.apply()?;
    if let Some(path) = log_path {
        info!("Logging to file: {}", path.display());
    }
    Ok(())
}

fn run(args: &CliArgs) -> Result<BatchOutcome> {
    let options = DriverOptions::from_args(args)?;
    let config = ToolConfig::from_args(args);
    info!(
        "Model: {} | phone: {} | subsample: {} | threads: {} | format: {}",
        options.metric.model,
        options.metric.phone,
        options.metric.subsample,
        config.threads,
        options.metric.report_format.extension()
    );

    let tools = FfmpegTools::new(config.clone());
    let driver = Driver::new(&tools, &tools, config, options);
    let outcome = driver.run(&args.distorted, &args.reference)?;

    for result in &outcome.completed {
        print_outcome(result);
    }
    Ok(outcome)
}

fn print_outcome(result: &ComparisonOutcome) {
    println!("Distorted: {}", result.main.display());
    match &result.alignment {
        Some(alignment) => println!(
            "  offset: {} s (psnr: {:.4} dB)",
            alignment.offset, alignment.fidelity_score
        ),
        None => println!("  offset: {} s", result.offset),
    }
    for (field, mean) in &result.scores {
        println!("  {}: {:.4}", field, mean);
    }
    if let Some(report) = &result.report {
        println!("  report: {}", report.path.display());
    }
    if let Some(plot) = &result.plot {
        println!("  plot: {}", plot.display());
    }
}
