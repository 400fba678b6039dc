//! Reports lifecycle timings of pods started by derived jobs.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::Instrument;

use cronprimer_core::lifecycle::{format_duration, Extraction, InstanceRef, TimingExtractor};
use cronprimer_core::metrics::PrimerMetrics;
use cronprimer_core::observability::observe_span;

use crate::cluster::{Narrator, Note, PodEventSource, SourceStore};
use crate::derived::PRIMED_CRON_LABEL;
use crate::error::{Error, Result};

/// Node selector key naming the node pool a pod runs on.
pub const NODE_POOL_SELECTOR: &str = "agentpool";

/// Node pool reported when the pod does not select one.
pub const UNSET_NODE_POOL: &str = "unset";

const METRICS_REASON: &str = "Metrics";

/// What a timing pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// The pod does not belong to a primed job.
    NotPrimed,
    /// The source the pod belongs to no longer exists.
    SourceMissing,
    /// The pod has no events yet.
    NoEvents,
    /// No events arrived since the last pass.
    NothingNew,
    /// Durations were reported.
    Reported {
        /// Number of durations reported.
        transitions: usize,
        /// Whether the start delay could not be computed.
        partial_failure: bool,
    },
}

/// Node pool a pod runs on.
#[must_use]
pub fn node_pool(pod: &Pod) -> &str {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_selector.as_ref())
        .and_then(|s| s.get(NODE_POOL_SELECTOR))
        .map_or(UNSET_NODE_POOL, String::as_str)
}

/// Runs one timing pass for `pod` at `now`.
///
/// # Errors
///
/// Returns an error when a cluster call fails or the pod lacks a namespace
/// or creation time.
pub async fn observe_pod<C>(
    cluster: &C,
    extractor: &TimingExtractor,
    metrics: &PrimerMetrics,
    pod: &Pod,
    now: DateTime<Utc>,
) -> Result<ObservationOutcome>
where
    C: SourceStore + PodEventSource + Narrator,
{
    let pod_name = pod.name_any();
    let namespace = pod
        .namespace()
        .ok_or_else(|| Error::missing("Pod", &pod_name, "namespace"))?;

    observe(cluster, extractor, metrics, pod, &namespace, &pod_name, now)
        .instrument(observe_span(&namespace, &pod_name))
        .await
}

async fn observe<C>(
    cluster: &C,
    extractor: &TimingExtractor,
    metrics: &PrimerMetrics,
    pod: &Pod,
    namespace: &str,
    pod_name: &str,
    now: DateTime<Utc>,
) -> Result<ObservationOutcome>
where
    C: SourceStore + PodEventSource + Narrator,
{
    let Some(source_name) = pod.labels().get(PRIMED_CRON_LABEL) else {
        return Ok(ObservationOutcome::NotPrimed);
    };
    let Some(source) = cluster.get_source(namespace, source_name).await? else {
        tracing::info!(source = %source_name, "source no longer exists, likely deleted recently");
        return Ok(ObservationOutcome::SourceMissing);
    };
    let created_at = pod
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .ok_or_else(|| Error::missing("Pod", pod_name, "creationTimestamp"))?;

    let events = cluster.list_pod_events(namespace, pod_name).await?;
    let instance_key = format!("{namespace}/{pod_name}");
    let instance = InstanceRef {
        name: &instance_key,
        created_at,
        original_schedule: source.original_schedule(),
    };

    let timings = match extractor.extract(instance, events, now)? {
        Extraction::NoEvents => return Ok(ObservationOutcome::NoEvents),
        Extraction::NothingNew => return Ok(ObservationOutcome::NothingNew),
        Extraction::Computed(timings) => timings,
    };

    if let Some(error) = &timings.partial_failure {
        tracing::warn!(error = %error, "partial failure generating transition times");
        cluster
            .narrate(
                &source,
                Note::warning(
                    METRICS_REASON,
                    format!("Partial failure generating transition times: {error}"),
                ),
            )
            .await;
    }

    let pool = node_pool(pod);
    let observations = timings.observations();
    for observation in &observations {
        tracing::info!(
            transition = %observation.transition,
            seconds = observation.seconds,
            sign = observation.sign.as_str(),
            node_pool = pool,
            "observed transition"
        );
        cluster
            .narrate(
                &source,
                Note::normal(
                    METRICS_REASON,
                    format!(
                        "Event {} took {} on pod {pod_name}",
                        observation.transition,
                        format_duration(observation.duration)
                    ),
                ),
            )
            .await;
        metrics.observe_transition(&source.name_any(), pool, observation);
    }

    cluster
        .narrate(
            &source,
            Note::normal("Debug", "Metrics calculated for PreScaledCronJob invocation."),
        )
        .await;

    Ok(ObservationOutcome::Reported {
        transitions: observations.len(),
        partial_failure: timings.partial_failure.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use std::collections::BTreeMap;

    #[test]
    fn node_pool_defaults_to_unset() {
        assert_eq!(node_pool(&Pod::default()), UNSET_NODE_POOL);
    }

    #[test]
    fn node_pool_reads_selector() {
        let pod = Pod {
            spec: Some(PodSpec {
                node_selector: Some(BTreeMap::from([(
                    NODE_POOL_SELECTOR.to_string(),
                    "batch".to_string(),
                )])),
                ..PodSpec::default()
            }),
            ..Pod::default()
        };
        assert_eq!(node_pool(&pod), "batch");
    }
}
