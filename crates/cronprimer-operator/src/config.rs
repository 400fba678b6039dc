//! Operator configuration from flags and environment.

use std::time::Duration;

use clap::Parser;

use cronprimer_core::high_water::{DEFAULT_CAPACITY, DEFAULT_TTL_MINUTES};
use cronprimer_core::observability::LogFormat;

/// Image used for the warm-up container when none is configured.
pub const DEFAULT_INIT_CONTAINER_IMAGE: &str = "initcontainer:1";

/// Runs CronJobs early with a warm-up step and reports how long they took
/// to start.
#[derive(Debug, Clone, Parser)]
#[command(name = "cronprimer-operator")]
#[command(version)]
pub struct OperatorConfig {
    /// Image of the injected warm-up init container.
    #[arg(long, env = "INIT_CONTAINER_IMAGE", default_value = DEFAULT_INIT_CONTAINER_IMAGE)]
    pub init_container_image: String,

    /// Port serving `/alive`, `/ready` and `/metrics`.
    #[arg(long, env = "CRONPRIMER_PROBE_PORT", default_value_t = 8081)]
    pub probe_port: u16,

    /// Log output format (`json` or `pretty`).
    #[arg(long, env = "CRONPRIMER_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Minutes a high-water mark is kept after its last update.
    #[arg(long, env = "CRONPRIMER_HWM_TTL_MINUTES", default_value_t = DEFAULT_TTL_MINUTES)]
    pub hwm_ttl_minutes: i64,

    /// Maximum number of pods tracked for event de-duplication.
    #[arg(long, env = "CRONPRIMER_HWM_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub hwm_capacity: usize,

    /// Seconds to wait before retrying a failed reconcile.
    #[arg(long, env = "CRONPRIMER_REQUEUE_SECS", default_value_t = 30)]
    pub requeue_secs: u64,

    /// Print the `PreScaledCronJob` CRD as JSON and exit.
    #[arg(long)]
    pub print_crd: bool,
}

impl OperatorConfig {
    /// High-water mark lifetime.
    #[must_use]
    pub fn hwm_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hwm_ttl_minutes.max(1))
    }

    /// Retry delay after a failed reconcile.
    #[must_use]
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}
