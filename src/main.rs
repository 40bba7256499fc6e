//! Command line entry point: reads options, prepares the process, runs one
//! sweep and prints where it stopped.
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::Colorize;
use rangescan::address_strategy::{read_address_list, AddressStrategy};
use rangescan::input::{Config, Opts};
use rangescan::scanner::Scanner;
use rangescan::sink::FileStore;
use rangescan::stats::spawn_reporter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(unix)]
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone())?;
    opts.merge(&config);

    let start = opts.start()?;
    let list = match &opts.input {
        Some(path) => Some(
            read_address_list(path)
                .await
                .with_context(|| format!("reading address list {}", path.display()))?,
        ),
        None => None,
    };
    let strategy = AddressStrategy::pick(start, list);

    let settings = opts.settings();
    let wanted = (settings.workers * settings.tasks_per_worker) as u64;
    let ulimit = adjust_ulimit_size(&opts);
    if ulimit < wanted {
        warn!(
            ulimit,
            wanted, "open file limit is below workers × tasks; expect dial failures"
        );
    }

    let scanner = Scanner::new(settings);
    let store = FileStore::new(opts.out_dir.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let stop_reporter = CancellationToken::new();
    let reporter = spawn_reporter(
        scanner.stats(),
        REPORT_INTERVAL,
        opts.quiet,
        stop_reporter.clone(),
    );

    let began = Instant::now();
    let result = scanner.run(strategy, &store, shutdown).await;
    stop_reporter.cancel();
    let _ = reporter.await;
    let summary = result?;

    let last = summary
        .last_reached
        .map_or_else(|| "none".to_owned(), |addr| addr.to_string());
    println!("{} {}", "Last IP:".bold(), last.green());
    println!(
        "{} {} saved of {} dispatched in {:.1?}",
        "Totals:".bold(),
        summary.succeeded.to_string().green(),
        summary.dispatched,
        began.elapsed(),
    );
    if !summary.exhausted {
        println!("{}", format!("Resume with --ip {last}").yellow());
    }

    Ok(())
}

/// Cancels `shutdown` on Ctrl-C or, on unix, SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("interrupt received, draining");
    shutdown.cancel();
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            info!(limit, "automatically increasing ulimit value");
        } else {
            warn!(limit, "failed to set ulimit value");
        }
    }

    let (soft, _) = Resource::NOFILE.get().unwrap_or((DEFAULT_FILE_DESCRIPTORS_LIMIT, 0));
    info!(soft_limit = soft, "open file limit");
    soft
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_opts: &Opts) -> u64 {
    u64::MAX
}
