//! Entry point of the cronprimer operator.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::{Client, CustomResourceExt};

use cronprimer_core::high_water::HighWaterMarkCache;
use cronprimer_core::lifecycle::{TimingExtractor, WarmupStep};
use cronprimer_core::metrics::PrimerMetrics;
use cronprimer_core::observability::init_logging;
use cronprimer_operator::cluster::KubeCluster;
use cronprimer_operator::config::OperatorConfig;
use cronprimer_operator::controllers::synchronizer::SyncSettings;
use cronprimer_operator::controllers::{run_pod_controller, run_source_controller, OperatorContext};
use cronprimer_operator::crd::PreScaledCronJob;
use cronprimer_operator::derived::WARMUP_CONTAINER_NAME;
use cronprimer_operator::probes;

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    if config.print_crd {
        println!("{}", serde_json::to_string_pretty(&PreScaledCronJob::crd())?);
        return Ok(());
    }

    init_logging(config.log_format);
    probes::init_metrics().context("failed to install metrics recorder")?;

    tracing::info!(
        init_container_image = %config.init_container_image,
        probe_port = config.probe_port,
        hwm_ttl_minutes = config.hwm_ttl_minutes,
        "starting cronprimer operator"
    );

    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    let metrics = PrimerMetrics::new();
    let cache = Arc::new(HighWaterMarkCache::new(config.hwm_ttl(), config.hwm_capacity));
    let ctx = Arc::new(OperatorContext {
        cluster: KubeCluster::new(client, std::env::var("POD_NAME").ok()),
        sync: SyncSettings {
            warmup_image: config.init_container_image.clone(),
            metrics,
        },
        extractor: TimingExtractor::new(cache, WarmupStep::init_container(WARMUP_CONTAINER_NAME)),
        metrics,
        requeue_after: config.requeue_after(),
    });

    let probe_port = config.probe_port;
    let probe_server = tokio::spawn(async move {
        if let Err(error) = probes::serve(probe_port).await {
            tracing::error!(error = %error, "probe server failed");
        }
    });

    futures::future::join(
        run_source_controller(Arc::clone(&ctx)),
        run_pod_controller(ctx),
    )
    .await;

    probe_server.abort();
    tracing::info!("cronprimer operator stopped");
    Ok(())
}
