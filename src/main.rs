//! SchemaWatch - Database Schema Drift Monitor
//!
//! Periodically reads table and column metadata from PostgreSQL, MySQL and
//! Oracle instances, compares it with the last accepted snapshot, and posts
//! a markdown summary of every structural change to a group-chat webhook.
//!
//! - Connectors: one catalog reader per dialect, degrading to empty on failure
//! - Snapshots: structural model, diff engine, ignore policy, baselines
//! - Alerts: markdown formatter and webhook sink
//! - Scheduler: one non-overlapping job per instance with an error cooldown

mod alert;
mod config;
mod connector;
mod error;
mod monitor;
mod scheduler;
mod snapshot;

use crate::alert::{AlertSink, WebhookSink};
use crate::config::{LogFormat, Settings};
use crate::monitor::InstanceMonitor;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::snapshot::IgnorePolicy;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = match Settings::load_from_env() {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing("info", LogFormat::Compact, None);
            error!("❌ FATAL: {}", e);
            std::process::exit(1);
        }
    };
    let global = settings.global;

    let log_file = match global.log_file.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(e) => {
            init_tracing("info", LogFormat::Compact, None);
            error!("❌ FATAL: cannot open log file: {}", e);
            std::process::exit(1);
        }
    };
    // flushes the file writer when dropped
    let log_guard = init_tracing(&global.log_level, global.log_format, log_file);
    info!("🚀 Starting SchemaWatch - Database Schema Drift Monitor...");
    if let Some(path) = &global.log_file {
        info!(path = %path.display(), "📝 Logging to file");
    }
    for key in &global.unapplied_keys {
        warn!(key = %key, "⚠️  log rotation settings are not applied, rotate the log file externally");
    }

    for (name, e) in &settings.rejected {
        error!(instance = %name, "❌ Instance skipped: {}", e);
    }
    if settings.instances.is_empty() {
        error!("❌ FATAL: no usable database instances configured");
        drop(log_guard);
        std::process::exit(1);
    }

    let policy = Arc::new(IgnorePolicy::new(
        global.ignore_tables.clone(),
        global.ignore_change_types.clone(),
    ));
    let webhook = WebhookSink::new(global.webhook.clone())?;
    if webhook.is_disabled() {
        warn!("⚠️  wechat.webhook not set, alerts will only be logged");
    }
    let sink: Arc<dyn AlertSink> = Arc::new(webhook);

    info!(
        instances = settings.instances.len(),
        interval = ?global.check_interval,
        worker_slots = global.worker_slots,
        ignored_tables = ?global.ignore_tables,
        ignored_change_types = ?global.ignore_change_types,
        "📋 Configuration loaded"
    );

    let mut scheduler = Scheduler::new(SchedulerConfig {
        interval: global.check_interval,
        worker_slots: global.worker_slots,
        error_cooldown: global.error_cooldown,
    });
    for instance in settings.instances {
        scheduler.register(InstanceMonitor::from_config(instance, policy.clone(), sink.clone()));
    }
    info!("🔍 Monitoring {} instance(s)", scheduler.job_count());

    shutdown_signal().await;

    for stats in scheduler.shutdown().await {
        info!(
            instance = %stats.name,
            runs = stats.runs,
            failures = stats.failures,
            skipped_ticks = stats.skipped_ticks,
            "job finished"
        );
    }

    info!("👋 SchemaWatch shutdown complete");
    drop(log_guard);
    Ok(())
}

/// Open the log file for appending, creating its directory if needed
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize tracing with structured logging. `RUST_LOG` wins over the configured level.
///
/// With a log file, the same events are also written to it through a
/// non-blocking writer. The returned guard must live until shutdown.
fn init_tracing(level: &str, format: LogFormat, log_file: Option<File>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) = match log_file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .compact(),
            )
            .with(file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .compact()
            }))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .with(file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(writer)
            }))
            .init(),
    }
    guard
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
