//! Reconcilers and the `kube` controller loops that drive them.
//!
//! Two independent loops run side by side:
//!
//! - the **source controller** watches `PreScaledCronJob` objects (and the
//!   cron jobs they own) and runs [`synchronizer::sync_source`];
//! - the **pod controller** watches pods labelled `primedcron` and runs
//!   [`pod_timing::observe_pod`].
//!
//! Both only requeue on transient errors; every other outcome waits for the
//! next change notification.

pub mod pod_timing;
pub mod synchronizer;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, ResourceExt};

use cronprimer_core::lifecycle::TimingExtractor;
use cronprimer_core::metrics::PrimerMetrics;

use crate::cluster::KubeCluster;
use crate::crd::PreScaledCronJob;
use crate::derived::PRIMED_CRON_LABEL;
use crate::error::{Error, Result};

use self::synchronizer::SyncSettings;

/// State shared by both controllers.
#[derive(Debug)]
pub struct OperatorContext {
    /// Cluster access.
    pub cluster: KubeCluster,
    /// Synchronizer settings.
    pub sync: SyncSettings,
    /// Timing extractor with its high-water mark cache.
    pub extractor: TimingExtractor,
    /// Metrics recorder.
    pub metrics: PrimerMetrics,
    /// Delay before retrying a failed pass.
    pub requeue_after: Duration,
}

async fn reconcile_source(source: Arc<PreScaledCronJob>, ctx: Arc<OperatorContext>) -> Result<Action> {
    let name = source.name_any();
    let namespace = source
        .namespace()
        .ok_or_else(|| Error::missing("PreScaledCronJob", &name, "namespace"))?;

    let outcome = synchronizer::sync_source(&ctx.cluster, &ctx.sync, &namespace, &name).await?;
    tracing::info!(%namespace, %name, ?outcome, "source reconciled");
    Ok(Action::await_change())
}

async fn reconcile_pod(pod: Arc<Pod>, ctx: Arc<OperatorContext>) -> Result<Action> {
    let outcome = pod_timing::observe_pod(
        &ctx.cluster,
        &ctx.extractor,
        &ctx.metrics,
        &pod,
        chrono::Utc::now(),
    )
    .await?;
    tracing::debug!(pod = %pod.name_any(), ?outcome, "pod observed");
    Ok(Action::await_change())
}

fn error_policy<K: ResourceExt>(object: Arc<K>, error: &Error, ctx: Arc<OperatorContext>) -> Action {
    tracing::warn!(
        object = %object.name_any(),
        error = %error,
        "reconcile failed, will retry"
    );
    Action::requeue(ctx.requeue_after)
}

/// Runs the source controller until shutdown is signalled.
pub async fn run_source_controller(ctx: Arc<OperatorContext>) {
    let client = ctx.cluster.client().clone();
    let sources = Api::<PreScaledCronJob>::all(client.clone());
    let cron_jobs = Api::<CronJob>::all(client);

    Controller::new(sources, watcher::Config::default())
        .owns(cron_jobs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_source, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::debug!(error = %error, "source controller event");
            }
        })
        .await;
    tracing::info!("source controller stopped");
}

/// Runs the pod controller until shutdown is signalled.
pub async fn run_pod_controller(ctx: Arc<OperatorContext>) {
    let pods = Api::<Pod>::all(ctx.cluster.client().clone());

    Controller::new(pods, watcher::Config::default().labels(PRIMED_CRON_LABEL))
        .shutdown_on_signal()
        .run(reconcile_pod, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::debug!(error = %error, "pod controller event");
            }
        })
        .await;
    tracing::info!("pod controller stopped");
}
