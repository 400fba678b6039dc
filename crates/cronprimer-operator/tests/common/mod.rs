//! Fixtures shared by the operator integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use metrics_util::debugging::{DebugValue, Snapshotter};
use serde_json::json;

use cronprimer_operator::crd::PreScaledCronJob;
use cronprimer_operator::derived::{CASCADE_FINALIZER, PRIMED_CRON_LABEL};

pub const NAMESPACE: &str = "jobs";

pub fn source(name: &str, schedule: &str, warmup: u32) -> PreScaledCronJob {
    serde_json::from_value(json!({
        "apiVersion": "psc.cronprimer.local/v1alpha1",
        "kind": "PreScaledCronJob",
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "uid": format!("uid-{name}"),
            "resourceVersion": "1"
        },
        "spec": {
            "warmUpTimeMins": warmup,
            "cronJob": {
                "spec": {
                    "schedule": schedule,
                    "jobTemplate": {
                        "spec": {
                            "template": {
                                "spec": {
                                    "containers": [{ "name": "job", "image": "busybox" }],
                                    "restartPolicy": "OnFailure"
                                }
                            }
                        }
                    }
                }
            }
        }
    }))
    .expect("valid source manifest")
}

pub fn finalized_source(name: &str, schedule: &str, warmup: u32) -> PreScaledCronJob {
    let mut source = source(name, schedule, warmup);
    source.metadata.finalizers = Some(vec![CASCADE_FINALIZER.to_string()]);
    source
}

pub fn pod(name: &str, source: Option<&str>, created_at: DateTime<Utc>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            creation_timestamp: Some(Time(created_at)),
            labels: source.map(|s| BTreeMap::from([(PRIMED_CRON_LABEL.to_string(), s.to_string())])),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec::default()),
        ..Pod::default()
    }
}

pub fn event(
    uid: &str,
    reason: &str,
    component: &str,
    field_path: Option<&str>,
    at: DateTime<Utc>,
) -> Event {
    Event {
        metadata: ObjectMeta {
            uid: Some(uid.to_string()),
            ..ObjectMeta::default()
        },
        reason: Some(reason.to_string()),
        source: Some(EventSource {
            component: Some(component.to_string()),
            host: None,
        }),
        involved_object: ObjectReference {
            field_path: field_path.map(str::to_string),
            ..ObjectReference::default()
        },
        first_timestamp: Some(Time(at)),
        last_timestamp: Some(Time(at)),
        ..Event::default()
    }
}

/// Value of the action counter labelled `action`/`outcome`, if recorded.
pub fn action_count(snapshotter: &Snapshotter, action: &str, outcome: &str) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let key = key.key();
            let matches = key.name() == cronprimer_core::metrics::names::CRONJOB_ACTION_TOTAL
                && key.labels().any(|l| l.key() == "action" && l.value() == action)
                && key.labels().any(|l| l.key() == "outcome" && l.value() == outcome);
            match value {
                DebugValue::Counter(count) if matches => Some(count),
                _ => None,
            }
        })
}

/// Every histogram sample in one snapshot as `(name, labels, seconds)`.
pub fn histogram_samples(snapshotter: &Snapshotter) -> Vec<(String, Vec<(String, String)>, f64)> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .flat_map(|(key, _, _, value)| {
            let name = key.key().name().to_string();
            let labels: Vec<(String, String)> = key
                .key()
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();
            let samples: Vec<f64> = match value {
                DebugValue::Histogram(samples) => samples.into_iter().map(|s| s.0).collect(),
                _ => Vec::new(),
            };
            samples
                .into_iter()
                .map(move |s| (name.clone(), labels.clone(), s))
        })
        .collect()
}
