//! The boundary between the reconcilers and the cluster API.
//!
//! Reconcilers only talk to the cluster through these traits, so the same
//! logic runs against a live API server ([`KubeCluster`]) and in tests
//! ([`InMemoryCluster`]).
//!
//! ## Semantics
//!
//! - **Not found is not an error**: getters return `None`.
//! - **Errors are transient**: every `Err` is a failed API call the
//!   controller should retry.
//! - **Narration never fails**: notes are best-effort.

pub mod kube_cluster;
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Event as CoreEvent;

use cronprimer_core::lifecycle::LifecycleEvent;

use crate::crd::PreScaledCronJob;
use crate::error::Result;

pub use self::kube_cluster::KubeCluster;
pub use self::memory::InMemoryCluster;

/// Access to `PreScaledCronJob` objects.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Gets a source by namespace and name.
    async fn get_source(&self, namespace: &str, name: &str) -> Result<Option<PreScaledCronJob>>;

    /// Appends `finalizer` to `source` and persists it.
    async fn add_finalizer(&self, source: &PreScaledCronJob, finalizer: &str) -> Result<()>;
}

/// Access to derived `CronJob` objects.
#[async_trait]
pub trait CronJobStore: Send + Sync {
    /// Gets a cron job by namespace and name.
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>>;

    /// Creates `cron_job`.
    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<()>;

    /// Replaces an existing cron job with `cron_job`.
    async fn replace_cron_job(&self, cron_job: &CronJob) -> Result<()>;
}

/// Lifecycle events attached to pods.
#[async_trait]
pub trait PodEventSource: Send + Sync {
    /// Lists every event currently retained for the pod.
    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<LifecycleEvent>>;
}

/// Severity of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    /// Informational.
    Normal,
    /// Needs user attention.
    Warning,
}

/// A human-readable notification attached to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Severity.
    pub kind: NoteKind,
    /// Short machine-readable reason.
    pub reason: String,
    /// Message shown to the user.
    pub message: String,
}

impl Note {
    /// Creates an informational note.
    #[must_use]
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Creates a warning note.
    #[must_use]
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Publishes notes about sources.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Attaches `note` to `source`. Failures are logged, not returned.
    async fn narrate(&self, source: &PreScaledCronJob, note: Note);
}

/// Converts a core/v1 event to a lifecycle event.
///
/// The first-observed time falls back to the event time, then to the object
/// creation time; the last-observed time falls back to the first-observed
/// time. Events without a UID or any timestamp are dropped.
#[must_use]
pub fn lifecycle_event(event: CoreEvent) -> Option<LifecycleEvent> {
    let uid = event.metadata.uid?;
    let first_timestamp = event
        .first_timestamp
        .map(|t| t.0)
        .or_else(|| event.event_time.map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.map(|t| t.0))?;
    let last_timestamp = event.last_timestamp.map_or(first_timestamp, |t| t.0);

    Some(LifecycleEvent {
        uid,
        reason: event.reason.unwrap_or_default(),
        source_component: event.source.and_then(|s| s.component),
        field_path: event.involved_object.field_path,
        first_timestamp,
        last_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::{EventSource, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};

    fn core_event() -> CoreEvent {
        CoreEvent {
            metadata: ObjectMeta {
                uid: Some("ev-1".into()),
                ..ObjectMeta::default()
            },
            reason: Some("Started".into()),
            source: Some(EventSource {
                component: Some("kubelet".into()),
                host: None,
            }),
            involved_object: ObjectReference {
                field_path: Some("spec.containers{job}".into()),
                ..ObjectReference::default()
            },
            ..CoreEvent::default()
        }
    }

    #[test]
    fn converts_core_event() {
        let first = Utc.with_ymd_and_hms(2020, 1, 29, 12, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2020, 1, 29, 12, 0, 9).unwrap();
        let mut event = core_event();
        event.first_timestamp = Some(Time(first));
        event.last_timestamp = Some(Time(last));

        let converted = lifecycle_event(event).unwrap();
        assert_eq!(converted.uid, "ev-1");
        assert_eq!(converted.reason, "Started");
        assert_eq!(converted.source_component.as_deref(), Some("kubelet"));
        assert_eq!(converted.field_path.as_deref(), Some("spec.containers{job}"));
        assert_eq!(converted.first_timestamp, first);
        assert_eq!(converted.last_timestamp, last);
    }

    #[test]
    fn falls_back_to_event_time() {
        let at = Utc.with_ymd_and_hms(2020, 1, 29, 12, 0, 0).unwrap();
        let mut event = core_event();
        event.event_time = Some(MicroTime(at));

        let converted = lifecycle_event(event).unwrap();
        assert_eq!(converted.first_timestamp, at);
        assert_eq!(converted.last_timestamp, at);
    }

    #[test]
    fn drops_events_without_identity_or_time() {
        assert!(lifecycle_event(core_event()).is_none());

        let mut event = core_event();
        event.metadata.uid = None;
        event.first_timestamp = Some(Time(Utc::now()));
        assert!(lifecycle_event(event).is_none());
    }
}
