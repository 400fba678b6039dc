//! Boundary implementation backed by the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};

use cronprimer_core::lifecycle::LifecycleEvent;

use super::{lifecycle_event, CronJobStore, Narrator, Note, NoteKind, PodEventSource, SourceStore};
use crate::crd::PreScaledCronJob;
use crate::error::{Error, Result};

/// Name the operator reports events under.
pub const CONTROLLER_NAME: &str = "cronprimer-operator";

/// Cluster access through a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Creates a cluster handle reporting events as `instance`.
    #[must_use]
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn sources(&self, namespace: &str) -> Api<PreScaledCronJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cron_jobs(&self, namespace: &str) -> Api<CronJob> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn name_and_namespace<K: Resource>(object: &K, kind: &'static str) -> Result<(String, String)> {
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::missing(kind, "", "name"))?;
    let namespace = object
        .meta()
        .namespace
        .clone()
        .ok_or_else(|| Error::missing(kind, &name, "namespace"))?;
    Ok((name, namespace))
}

#[async_trait]
impl SourceStore for KubeCluster {
    async fn get_source(&self, namespace: &str, name: &str) -> Result<Option<PreScaledCronJob>> {
        Ok(self.sources(namespace).get_opt(name).await?)
    }

    async fn add_finalizer(&self, source: &PreScaledCronJob, finalizer: &str) -> Result<()> {
        let (name, namespace) = name_and_namespace(source, "PreScaledCronJob")?;
        let mut updated = source.clone();
        updated.finalizers_mut().push(finalizer.to_string());
        self.sources(&namespace)
            .replace(&name, &PostParams::default(), &updated)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CronJobStore for KubeCluster {
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>> {
        Ok(self.cron_jobs(namespace).get_opt(name).await?)
    }

    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<()> {
        let (_, namespace) = name_and_namespace(cron_job, "CronJob")?;
        self.cron_jobs(&namespace)
            .create(&PostParams::default(), cron_job)
            .await?;
        Ok(())
    }

    async fn replace_cron_job(&self, cron_job: &CronJob) -> Result<()> {
        let (name, namespace) = name_and_namespace(cron_job, "CronJob")?;
        self.cron_jobs(&namespace)
            .replace(&name, &PostParams::default(), cron_job)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PodEventSource for KubeCluster {
    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<LifecycleEvent>> {
        let selector = format!("involvedObject.name={pod},involvedObject.namespace={namespace}");
        let events = Api::<CoreEvent>::namespaced(self.client.clone(), namespace)
            .list(&ListParams::default().fields(&selector))
            .await?;
        Ok(events.items.into_iter().filter_map(lifecycle_event).collect())
    }
}

#[async_trait]
impl Narrator for KubeCluster {
    async fn narrate(&self, source: &PreScaledCronJob, note: Note) {
        let event = Event {
            type_: match note.kind {
                NoteKind::Normal => EventType::Normal,
                NoteKind::Warning => EventType::Warning,
            },
            action: note.reason.clone(),
            reason: note.reason,
            note: Some(note.message),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, &source.object_ref(&())).await {
            tracing::warn!(
                source = %source.name_any(),
                error = %error,
                "failed to publish event"
            );
        }
    }
}
