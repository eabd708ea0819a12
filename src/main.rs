use clap::Parser;
use log::{debug, error, info, warn};
use pixsim::core::error::ErrorKind;
use pixsim::core::execution::ConcurrencyMode;
use pixsim::core::logging::init_logger;
use pixsim::{modules, ConfigReader, FrameworkError, Simulation};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "pixsim")]
#[command(about = "Modular event-based simulation of semiconductor pixel detectors", long_about = None)]
struct Args {
    /// Main configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long)]
    verbosity: Option<String>,

    /// Number of worker threads; enables multithreading when above 1
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Number of events to simulate
    #[arg(short = 'n', long)]
    events: Option<u64>,

    /// Override a header key, as key=value
    #[arg(short = 'o', long = "option", value_parser = parse_override)]
    options: Vec<(String, String)>,

    /// Also write the log to this file
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Do not print timestamps in front of log lines
    #[arg(long)]
    no_timestamps: bool,
}

fn parse_override(text: &str) -> std::result::Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected key=value, got '{}'", text)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let reader = ConfigReader::from_file(&args.config);
    let level = args
        .verbosity
        .clone()
        .or_else(|| {
            let header = reader.as_ref().ok()?.header();
            header.get::<String>("log_level").ok()
        })
        .unwrap_or_else(|| "info".to_string());
    if let Err(err) = init_logger(&level.to_lowercase(), !args.no_timestamps, args.log_file.as_deref()) {
        eprintln!("Cannot open log file: {}", err);
        return ExitCode::from(1);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| reader.and_then(|reader| run(&args, reader))));
    match outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            match err.kind() {
                ErrorKind::Configuration => error!("Error in the configuration:\n{}", err),
                ErrorKind::Library => error!("Error while loading modules:\n{}", err),
                ErrorKind::Runtime => error!("Error during execution of run:\n{}", err),
                ErrorKind::Logic => error!("Error in the logic of module:\n{}", err),
            }
            ExitCode::from(1)
        }
        Err(_) => {
            error!("Unexpected failure, aborting");
            ExitCode::from(127)
        }
    }
}

fn run(args: &Args, reader: ConfigReader) -> Result<(), FrameworkError> {
    info!("Reading configuration {}", args.config.display());
    let mut simulation = Simulation::new(reader, &args.options, modules::collections())?;

    let config = simulation.config_mut();
    if let Some(events) = args.events {
        config.number_of_events = events;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            warn!("Number of workers is zero, falling back to a single thread");
        }
        config.thread_pool_size = Some(workers.max(1));
        if workers > 1 {
            config.concurrency_mode = ConcurrencyMode::Rayon;
        }
    }

    let report = simulation.run_all()?;
    info!(
        "Simulated {} events with {} workers",
        report.events, report.workers
    );
    for stats in &report.modules {
        info!("{}: {} runs, {} skipped", stats.module, stats.runs, stats.skipped);
    }
    if let Ok(json) = serde_json::to_string(&report) {
        debug!("Run report: {}", json);
    }
    Ok(())
}
