//! pgpoll - PostgreSQL metrics polling daemon.
//!
//! Runs gather passes over the configured servers and writes every
//! observation to stdout, one line each. Without `--interval` a single pass
//! is run and its result becomes the exit status.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pgpoll_core::driver::PgDriver;
use pgpoll_core::{Config, DESCRIPTION, Gatherer, LineSink, SAMPLE_CONFIG};

/// PostgreSQL metrics polling daemon.
#[derive(Parser)]
#[command(name = "pgpoll", about = DESCRIPTION, version)]
struct Args {
    /// Path to the JSON configuration file. Without it the local server's
    /// pg_stat_database is collected.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between passes. Runs a single pass when omitted.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Prefix for metric names in the output.
    #[arg(long, default_value = "postgresql")]
    prefix: String,

    /// Connect without TLS even when the address asks for it.
    #[arg(long)]
    no_tls: bool,

    /// Print an annotated sample configuration and exit.
    #[arg(long)]
    sample_config: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so stdout carries observations only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pgpoll", "pgpoll_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration for the next pass. A broken file keeps the
/// previous configuration when there is one.
fn load_config(path: Option<&PathBuf>, previous: Option<Config>) -> Option<Config> {
    let Some(path) = path else {
        return Some(previous.unwrap_or_default());
    };
    match Config::from_path(path) {
        Ok(config) => {
            debug!(
                path = %path.display(),
                servers = config.servers.len(),
                queries = config.queries.len(),
                "configuration loaded"
            );
            Some(config)
        }
        Err(e) => match previous {
            Some(config) => {
                warn!(path = %path.display(), error = %e, "keeping previous configuration");
                Some(config)
            }
            None => {
                error!(path = %path.display(), error = %e, "cannot load configuration");
                None
            }
        },
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.sample_config {
        print!("{}", SAMPLE_CONFIG);
        return ExitCode::SUCCESS;
    }

    init_logging(args.verbose, args.quiet);
    info!("pgpoll {} starting", env!("CARGO_PKG_VERSION"));

    let Some(mut config) = load_config(args.config.as_ref(), None) else {
        return ExitCode::FAILURE;
    };

    let driver = if args.no_tls {
        PgDriver::without_tls()
    } else {
        PgDriver::new()
    };
    let mut gatherer = Gatherer::new(driver);
    let mut sink = LineSink::new(std::io::stdout()).with_prefix(args.prefix.as_str());

    let Some(interval) = args.interval.map(Duration::from_secs) else {
        return match gatherer.gather(&config, &mut sink) {
            Ok(summary) if summary.failures.is_empty() => ExitCode::SUCCESS,
            Ok(summary) => {
                for failure in &summary.failures {
                    error!(server = %failure.server, error = %failure.error, "server failed");
                }
                ExitCode::FAILURE
            }
            Err(e) => {
                error!("gather failed: {}", e);
                ExitCode::FAILURE
            }
        };
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!(interval_secs = interval.as_secs(), "Starting collection loop");
    let mut pass_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        pass_count += 1;

        if let Err(e) = gatherer.gather(&config, &mut sink) {
            error!(pass = pass_count, "gather failed: {}", e);
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval.saturating_sub(started.elapsed());
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }

        if let Some(next) = load_config(args.config.as_ref(), Some(config.clone())) {
            config = next;
        }
    }

    info!(passes = pass_count, "Shutting down");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_single_pass() {
        let args = Args::parse_from(["pgpoll"]);
        assert!(args.interval.is_none());
        assert!(args.config.is_none());
        assert_eq!(args.prefix, "postgresql");
    }

    #[test]
    fn args_accept_interval_and_config() {
        let args = Args::parse_from(["pgpoll", "-c", "/etc/pgpoll.json", "-i", "10", "-vv"]);
        assert_eq!(args.interval, Some(10));
        assert_eq!(args.config, Some(PathBuf::from("/etc/pgpoll.json")));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn missing_config_without_previous_is_none() {
        let path = PathBuf::from("/nonexistent/pgpoll.json");
        assert!(load_config(Some(&path), None).is_none());

        let kept = load_config(Some(&path), Some(Config::default()));
        assert_eq!(kept, Some(Config::default()));
    }

    #[test]
    fn no_config_path_means_default_config() {
        assert_eq!(load_config(None, None), Some(Config::default()));
    }
}
