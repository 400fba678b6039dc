//! The warm-up step injected into every derived job.
//!
//! It runs as the first init container of each pod the derived job starts.
//! It reads its own pod's creation time and blocks until the original
//! schedule's next fire after that moment, so the workload containers start
//! on the original schedule on a node that is already provisioned.
//!
//! The step never fails a pod over a missing or invalid schedule: it logs a
//! warning and lets the workload start immediately.

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};

use cronprimer_core::observability::LogFormat;
use cronprimer_core::schedule::StandardSchedule;

use crate::error::{Error, Result};

/// Default interval between progress checks while waiting.
pub const DEFAULT_POLL_SECS: u64 = 5;

/// Settings of the warm-up step, taken from the environment the derived job
/// injects.
#[derive(Debug, Clone, Parser)]
#[command(name = "cronprimer-warmup")]
#[command(version)]
pub struct WarmupConfig {
    /// Namespace of the pod.
    #[arg(long, env = "NAMESPACE")]
    pub namespace: String,

    /// Name of the pod; the kubelet sets `HOSTNAME` to it.
    #[arg(long, env = "HOSTNAME")]
    pub pod_name: String,

    /// The original schedule to wait for.
    #[arg(long, env = "CRONJOB_SCHEDULE")]
    pub schedule: Option<String>,

    /// Seconds between progress checks.
    #[arg(long, env = "WARMUP_POLL_SECS", default_value_t = DEFAULT_POLL_SECS)]
    pub poll_secs: u64,

    /// Log output format (`json` or `pretty`).
    #[arg(long, env = "CRONPRIMER_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl WarmupConfig {
    /// Interval between progress checks, at least one second.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }
}

/// What the warm-up step should do for a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitPlan {
    /// Block until this instant.
    Until(DateTime<Utc>),
    /// No schedule was provided.
    NoSchedule,
    /// The schedule does not parse.
    InvalidSchedule(String),
    /// The schedule never fires again.
    NoFireTime,
}

/// Decides how long a pod created at `created_at` waits for `schedule`.
#[must_use]
pub fn plan(schedule: Option<&str>, created_at: DateTime<Utc>) -> WaitPlan {
    let Some(expression) = schedule.map(str::trim).filter(|s| !s.is_empty()) else {
        return WaitPlan::NoSchedule;
    };
    match StandardSchedule::parse(expression) {
        Ok(schedule) => schedule
            .next_after(created_at)
            .map_or(WaitPlan::NoFireTime, WaitPlan::Until),
        Err(error) => WaitPlan::InvalidSchedule(error.to_string()),
    }
}

/// Time left until `deadline`, or `None` once it has been reached.
#[must_use]
pub fn remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (deadline - now).to_std().ok().filter(|left| !left.is_zero())
}

/// Sleeps until `now()` reaches `deadline`, waking at most every `poll`.
pub async fn wait_until<F>(deadline: DateTime<Utc>, poll: Duration, mut now: F)
where
    F: FnMut() -> DateTime<Utc>,
{
    while let Some(left) = remaining(deadline, now()) {
        tracing::info!(%deadline, remaining_secs = left.as_secs(), "waiting for original schedule");
        tokio::time::sleep(left.min(poll)).await;
    }
    tracing::info!(%deadline, "original schedule reached");
}

/// Creation time of the pod `namespace/name`.
///
/// # Errors
///
/// Returns an error if the pod cannot be read or has no creation time.
pub async fn pod_created_at(client: Client, namespace: &str, name: &str) -> Result<DateTime<Utc>> {
    let pod = Api::<Pod>::namespaced(client, namespace).get(name).await?;
    pod.metadata
        .creation_timestamp
        .map(|t| t.0)
        .ok_or_else(|| Error::missing("Pod", name, "creationTimestamp"))
}

/// Runs the warm-up step for the configured pod.
///
/// # Errors
///
/// Returns an error if the pod cannot be read.
pub async fn run(config: &WarmupConfig, client: Client) -> Result<()> {
    let created_at = pod_created_at(client, &config.namespace, &config.pod_name).await?;

    match plan(config.schedule.as_deref(), created_at) {
        WaitPlan::Until(deadline) => wait_until(deadline, config.poll_interval(), Utc::now).await,
        WaitPlan::NoSchedule => {
            tracing::warn!("no cron schedule passed via CRONJOB_SCHEDULE, not waiting");
        }
        WaitPlan::InvalidSchedule(error) => {
            tracing::warn!(%error, "invalid cron schedule, not waiting");
        }
        WaitPlan::NoFireTime => {
            tracing::warn!("cron schedule never fires again, not waiting");
        }
    }
    Ok(())
}
