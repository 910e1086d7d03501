//! Check Scheduler
//!
//! One tokio task per registered job. Each task owns its job, so a job's
//! checks run strictly one after another; a slow check simply swallows the
//! ticks it overran. Checks of different jobs run concurrently, bounded by a
//! shared pool of worker slots.
//!
//! A check that errors or panics arms a cooldown: ticks landing before the
//! deadline are skipped instead of sleeping inside the job.

use crate::error::MonitorResult;
use crate::monitor::{CycleReport, InstanceMonitor};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Something the scheduler can run on an interval
#[async_trait]
pub trait CheckJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Logging context for everything the job's task does
    fn span(&self) -> Span;

    /// Runs once when the job's task starts, before the first tick
    async fn probe(&self) {}

    async fn run(&mut self) -> MonitorResult<CycleReport>;
}

#[async_trait]
impl CheckJob for InstanceMonitor {
    fn name(&self) -> &str {
        InstanceMonitor::name(self)
    }

    fn span(&self) -> Span {
        InstanceMonitor::span(self).clone()
    }

    async fn probe(&self) {
        InstanceMonitor::probe(self).await
    }

    async fn run(&mut self) -> MonitorResult<CycleReport> {
        self.check().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub worker_slots: usize,
    pub error_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            worker_slots: 10,
            error_cooldown: Duration::from_secs(300),
        }
    }
}

/// Per-job counters, returned on shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub name: String,
    pub runs: usize,
    pub failures: usize,
    pub skipped_ticks: usize,
}

pub struct Scheduler {
    config: SchedulerConfig,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    jobs: Vec<JoinHandle<JobStats>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.worker_slots.max(1))),
            config,
            cancel: CancellationToken::new(),
            jobs: Vec::new(),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Start a job. Its first check fires immediately.
    pub fn register<J: CheckJob>(&mut self, job: J) {
        let span = job.span();
        let handle = tokio::spawn(
            run_job(job, self.config, self.slots.clone(), self.cancel.clone()).instrument(span),
        );
        self.jobs.push(handle);
    }

    /// Stop ticking, let in-flight checks finish, and join every job
    pub async fn shutdown(self) -> Vec<JobStats> {
        self.cancel.cancel();

        let mut stats = Vec::with_capacity(self.jobs.len());
        for handle in self.jobs {
            match handle.await {
                Ok(job_stats) => stats.push(job_stats),
                Err(e) => error!(error = %e, "job task ended abnormally"),
            }
        }
        stats
    }
}

async fn run_job<J: CheckJob>(
    mut job: J,
    config: SchedulerConfig,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
) -> JobStats {
    let mut stats = JobStats {
        name: job.name().to_string(),
        ..Default::default()
    };

    // created before probing so the first tick is still due immediately
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    job.probe().await;

    let mut cooldown_until: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(deadline) = cooldown_until {
            if Instant::now() < deadline {
                stats.skipped_ticks += 1;
                debug!(remaining = ?(deadline - Instant::now()), "in cooldown, tick skipped");
                continue;
            }
            cooldown_until = None;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(job.run()).catch_unwind().await;
        drop(permit);

        let failure = match outcome {
            Ok(Ok(report)) => {
                stats.runs += 1;
                info!(
                    schemas = report.schemas_checked,
                    events = report.events,
                    delivered = ?report.delivered,
                    elapsed = ?started.elapsed(),
                    "✅ check completed"
                );
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };

        if let Some(reason) = failure {
            stats.runs += 1;
            stats.failures += 1;
            cooldown_until = Some(Instant::now() + config.error_cooldown);
            error!(error = %reason, cooldown = ?config.error_cooldown, "❌ check failed");
        }
    }

    warn!(runs = stats.runs, failures = stats.failures, "job stopped");
    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
