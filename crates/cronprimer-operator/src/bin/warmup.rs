//! Warm-up init container: holds a primed pod until its original schedule.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;

use cronprimer_core::observability::init_logging;
use cronprimer_operator::warmup::{self, WarmupConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WarmupConfig::parse();
    init_logging(config.log_format);

    tracing::info!(
        namespace = %config.namespace,
        pod = %config.pod_name,
        schedule = config.schedule.as_deref().unwrap_or_default(),
        "starting warm-up step"
    );

    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;
    warmup::run(&config, client)
        .await
        .context("warm-up step failed")?;
    Ok(())
}
