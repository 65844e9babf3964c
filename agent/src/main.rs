mod command;
mod config;
mod http;
mod monitoring;
mod state;
mod subscription;
mod terminal;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hostpulse_core::history::HistoryStore;
use hostpulse_core::monitoring::SystemSampler;

use crate::config::AgentConfig;
use crate::http::AppState;
use crate::monitoring::backlight::Backlight;
use crate::monitoring::collector::LocalCollector;
use crate::state::persistence::{run_persistence_worker, BatteryHistoryFile};
use crate::subscription::SubscriptionClient;
use crate::terminal::{TerminalConfig, TerminalSessionManager};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often expired terminal sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

fn print_usage() {
    eprintln!("Usage: hostpulse-agent [--listen <addr>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --listen <addr>  HTTP bind address (default: $HOSTPULSE_LISTEN or 0.0.0.0:5020)");
    eprintln!("  --version        Print version and exit");
    eprintln!("  --help           Print this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut listen_override = None;

    match args.get(1).map(String::as_str) {
        None => {}
        Some("--version") => {
            println!("hostpulse-agent {}", VERSION);
            return Ok(());
        }
        Some("--help") => {
            print_usage();
            return Ok(());
        }
        Some("--listen") => match args.get(2) {
            Some(addr) => listen_override = Some(addr.clone()),
            None => {
                eprintln!("--listen requires an address");
                print_usage();
                std::process::exit(1);
            }
        },
        Some(other) => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AgentConfig::from_env();
    if let Some(addr) = listen_override {
        config.listen_addr = addr;
    }
    info!("hostpulse-agent {} starting", VERSION);
    for name in config.insecure_defaults() {
        warn!("{name} is set to its insecure built-in default; set it in the environment or .env");
    }

    run(config).await
}

async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    // History: restore, then subscribe before the startup append so the
    // worker sees it.
    let history = Arc::new(HistoryStore::new(config.history.clone()));
    let file = BatteryHistoryFile::in_dir(&config.state_dir);
    let restored = file.load();
    info!(
        "Loaded {} battery records from {}",
        restored.len(),
        file.path().display()
    );
    history.restore_battery(restored);
    let persistence = tokio::spawn(run_persistence_worker(
        history.subscribe_battery(),
        file.clone(),
        shutdown.clone(),
    ));

    let collector = Arc::new(LocalCollector::new());
    match collector.sample_battery().await {
        Ok(reading) => {
            history.record_battery(&reading, true);
        }
        Err(e) => info!("No battery reading at startup: {e}"),
    }

    let sampler: Arc<dyn SystemSampler> = collector.clone();
    let sampling = tokio::spawn(monitoring::run_sampling_loop(
        history.clone(),
        sampler,
        config.history.sample_period,
        shutdown.clone(),
    ));

    let terminal = Arc::new(TerminalSessionManager::new(TerminalConfig::new(
        config.terminal_password.clone(),
    )));
    let sweeper = tokio::spawn(sweep_sessions(terminal.clone(), shutdown.clone()));

    let state = Arc::new(AppState {
        history: history.clone(),
        backlight: Backlight::new(collector.sys_root()),
        collector,
        terminal,
        subscription: SubscriptionClient::new(config.subscription.clone())
            .context("building subscription client")?,
    });

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let served = http::serve(&config.listen_addr, state, &config.static_dir, shutdown.clone()).await;
    shutdown.cancel();

    for (name, task) in [
        ("sampling loop", sampling),
        ("persistence worker", persistence),
        ("session sweeper", sweeper),
    ] {
        if let Err(e) = task.await {
            warn!("{name} ended abnormally: {e}");
        }
    }

    // The worker has stopped; write the final series directly.
    let records = history.battery_history();
    let file_for_save = file.clone();
    match tokio::task::spawn_blocking(move || file_for_save.save(&records)).await {
        Ok(Ok(())) => info!("Battery history saved to {}", file.path().display()),
        Ok(Err(e)) => warn!("Final battery history save failed: {e}"),
        Err(e) => warn!("Final battery history save panicked: {e}"),
    }

    info!("hostpulse-agent stopped");
    served
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
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
                warn!("Cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

async fn sweep_sessions(terminal: Arc<TerminalSessionManager>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if terminal.sweep_expired().await > 0 {
                    info!("{} terminal session(s) still active", terminal.active_count().await);
                }
            }
        }
    }
}
