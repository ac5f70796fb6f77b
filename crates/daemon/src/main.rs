// SPDX-License-Identifier: Apache-2.0

//! Entry point for `teleclauded`.

use std::io::Write as _;
use teleclaude_daemon::{env, lifecycle, listener, protocol, workers};
use tracing_subscriber::prelude::*;

const LOG_ROTATE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version") {
        println!("teleclauded {}", protocol::PROTOCOL_VERSION);
        return;
    }
    if args.iter().any(|a| a == "--help") {
        println!("teleclauded: the TeleClaude coordination daemon. Run with no arguments to start.");
        return;
    }

    let config = lifecycle::Config::load();
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config.log_path);
    let _logging_guard = setup_logging(&config.log_path);

    let startup_result = match lifecycle::startup().await {
        Ok(result) => result,
        Err(lifecycle::LifecycleError::LockFailed(_)) => {
            eprintln!("teleclauded is already running (lock held at {})", config.lock_path.display());
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_failure(&config.log_path, &e);
            eprintln!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    let lifecycle::StartupResult { daemon, listener: unix_listener } = startup_result;
    let daemon = std::sync::Arc::new(daemon);
    let engine = std::sync::Arc::clone(&daemon.engine);
    let shutdown = std::sync::Arc::new(tokio::sync::Notify::new());

    tokio::spawn(listener::run(unix_listener, std::sync::Arc::clone(&engine), std::sync::Arc::clone(&shutdown)));
    workers::spawn_all(std::sync::Arc::clone(&engine), std::sync::Arc::clone(&shutdown));
    spawn_checkpoint_task(std::sync::Arc::clone(&daemon), std::sync::Arc::clone(&shutdown));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("sigterm handler");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).expect("sigint handler");

    println!("READY");
    tracing::info!("daemon started (pid {})", std::process::id());

    tokio::select! {
        _ = shutdown.notified() => tracing::info!("shutdown requested over the local API"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }

    if let Err(e) = daemon.shutdown() {
        tracing::error!(error = %e, "shutdown encountered an error");
    }
    tracing::info!("daemon stopped");
}

/// Background checkpoint: truncate the WAL only after a snapshot of the
/// already-processed prefix is durably on disk, so a crash between
/// snapshot and truncation always has a WAL tail to replay from
/// (`DaemonState::checkpoint`).
fn spawn_checkpoint_task(daemon: std::sync::Arc<lifecycle::DaemonState>, shutdown: std::sync::Arc<tokio::sync::Notify>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(env::checkpoint_interval_secs()));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let daemon = std::sync::Arc::clone(&daemon);
                    let result = tokio::task::spawn_blocking(move || daemon.checkpoint()).await;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!(error = %e, "periodic checkpoint failed"),
                        Err(e) => tracing::warn!(error = %e, "checkpoint task panicked"),
                    }
                }
                _ = shutdown.notified() => break,
            }
        }
    });
}

fn rotate_log_if_needed(log_path: &std::path::Path) {
    let Ok(metadata) = std::fs::metadata(log_path) else { return };
    if metadata.len() < LOG_ROTATE_THRESHOLD_BYTES {
        return;
    }
    for gen in (1..3).rev() {
        let from = log_path.with_extension(format!("log.{gen}"));
        let to = log_path.with_extension(format!("log.{}", gen + 1));
        let _ = std::fs::rename(from, to);
    }
    let _ = std::fs::rename(log_path, log_path.with_extension("log.1"));
}

fn write_startup_marker(log_path: &std::path::Path) {
    if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        let _ = writeln!(f, "--- teleclauded: starting (pid: {}) ---\n", std::process::id());
    }
}

fn write_startup_failure(log_path: &std::path::Path, error: &lifecycle::LifecycleError) {
    if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        let _ = writeln!(f, "startup failed: {error}");
    }
}

fn setup_logging(log_path: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
        log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("daemon.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();
    guard
}
