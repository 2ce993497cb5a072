//! conceal-replay - Drive the wallet state store from a stream of actions
//!
//! Builds a store from configuration, dispatches one JSON action per input
//! line, relays notifications to stderr and prints the final document.

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use libconceal::logging::{LogFormat, LoggingConfig};
use libconceal::{Config, Store, ToastBus, TokioTimers};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "conceal-replay")]
#[command(version)]
#[command(about = "Replay wallet actions through the application state store")]
#[command(long_about = "\
conceal-replay - Replay wallet actions through the application state store

DESCRIPTION:
    Reads one JSON action per line and dispatches each into a freshly
    initialized store, exactly as the wallet screens would. Blank lines
    and lines starting with '#' are skipped.

    Actions that are rejected (unknown kind, bad payload, unknown market)
    are reported with their line number and the replay continues.

USAGE:
    # Replay a session recording
    conceal-replay session.jsonl

    # Read from stdin and print the final document as JSON
    cat session.jsonl | conceal-replay --format json

    # Let SET_INTERVALS timers run for ten seconds before teardown
    conceal-replay --run-for 10s polling.jsonl

INPUT:
    {\"type\": \"USER_LOGGED_IN\"}
    {\"type\": \"UPDATE_BLOCKCHAIN_HEIGHT\", \"blockchainHeight\": 250000}
    {\"type\": \"SET_INTERVALS\", \"intervals\": [
        {\"action\": {\"type\": \"APP_UPDATED\"}, \"time\": 5}]}

SIGNALS:
    SIGTERM, SIGINT - End the --run-for wait early

CONFIGURATION:
    Configuration file: ~/.config/conceal/config.toml
    Override with --config or CONCEAL_CONFIG.

EXIT CODES:
    0 - Every line applied
    1 - Runtime error
    2 - Configuration error
    3 - One or more lines were rejected
")]
struct Cli {
    /// Action stream, one JSON object per line (`-` or absent reads stdin)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Configuration file (overrides CONCEAL_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep owned timers running this long before teardown
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    run_for: Option<Duration>,

    /// Print the document as left by the input, without CLEAR_APP
    #[arg(long)]
    keep: bool,

    /// Output format for the final document
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log output format (text, json, pretty)
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "warn".to_string(), cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(replay::exit_code(&e));
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    let toasts = Arc::new(ToastBus::default());
    let printer = spawn_toast_printer(toasts.subscribe());
    let timers = Arc::new(TokioTimers::from_current()?);
    let store = Store::init(&config, toasts.clone(), timers);

    let input = open_input(cli.input.as_deref())?;
    let report = replay::replay(&store, input)?;
    for failure in &report.failures {
        eprintln!("line {}: {}", failure.line, failure.message);
    }

    if let Some(duration) = cli.run_for {
        info!(duration = %humantime::format_duration(duration), "running owned timers");
        let shutdown = Arc::new(Notify::new());
        setup_signal_handlers(shutdown.clone())?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.notified() => info!("received shutdown signal, stopping early"),
        }
    }

    let state = if cli.keep {
        store.snapshot()
    } else {
        store.teardown()?
    };

    match cli.format {
        OutputFormat::Text => print!("{}", replay::summarize(&state)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize state")?
        ),
    }

    // Closing the bus lets the printer drain and exit
    drop(store);
    drop(toasts);
    if let Err(e) = printer.await {
        warn!(error = %e, "notification relay stopped abnormally");
    }

    Ok(if report.is_clean() { 0 } else { 3 })
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        None => Ok(Box::new(BufReader::new(std::io::stdin()))),
        Some(path) if path == Path::new("-") => Ok(Box::new(BufReader::new(std::io::stdin()))),
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// Print every notification to stderr until the bus closes
fn spawn_toast_printer(
    mut receiver: broadcast::Receiver<libconceal::Notification>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(toast) => eprintln!("[{}] {}", toast.severity, toast.message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "notification relay fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Set up signal handlers that end the timer wait
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<Notify>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            shutdown.notify_one();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<Notify>) -> Result<()> {
    Ok(())
}
