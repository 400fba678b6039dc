//! In-memory cluster for tests and local runs.
//!
//! Stores objects in `HashMap`s behind a single `RwLock` and records every
//! write and note so tests can assert on exactly what a reconcile pass did.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::{Resource, ResourceExt};

use cronprimer_core::lifecycle::LifecycleEvent;

use super::{lifecycle_event, CronJobStore, Narrator, Note, PodEventSource, SourceStore};
use crate::crd::PreScaledCronJob;
use crate::error::{Error, Result};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// A mutating call made against the in-memory cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// A finalizer was added to a source.
    AddFinalizer {
        /// Source name.
        name: String,
        /// The finalizer added.
        finalizer: String,
    },
    /// A cron job was created.
    CreateCronJob {
        /// Cron job name.
        name: String,
    },
    /// A cron job was replaced.
    ReplaceCronJob {
        /// Cron job name.
        name: String,
    },
}

/// A note together with the source it was attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNote {
    /// Name of the source.
    pub source: String,
    /// The note.
    pub note: Note,
}

#[derive(Debug, Default)]
struct ClusterState {
    sources: HashMap<Key, PreScaledCronJob>,
    cron_jobs: HashMap<Key, CronJob>,
    pod_events: HashMap<Key, Vec<CoreEvent>>,
    writes: Vec<Write>,
    notes: Vec<RecordedNote>,
    fail_writes: bool,
}

/// In-memory implementation of every boundary trait.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: RwLock<ClusterState>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::cluster("in-memory cluster lock poisoned")
}

fn object_key<K: Resource>(object: &K) -> Result<Key> {
    let meta = object.meta();
    match (&meta.namespace, &meta.name) {
        (Some(namespace), Some(name)) => Ok(key(namespace, name)),
        _ => Err(Error::cluster("object needs a namespace and a name")),
    }
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or overwrites a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source has no namespace or name.
    pub fn put_source(&self, source: PreScaledCronJob) -> Result<()> {
        let key = object_key(&source)?;
        self.state
            .write()
            .map_err(poison_err)?
            .sources
            .insert(key, source);
        Ok(())
    }

    /// Stores or overwrites a cron job without recording a write.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron job has no namespace or name.
    pub fn put_cron_job(&self, cron_job: CronJob) -> Result<()> {
        let key = object_key(&cron_job)?;
        self.state
            .write()
            .map_err(poison_err)?
            .cron_jobs
            .insert(key, cron_job);
        Ok(())
    }

    /// Appends an event to a pod's history.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn push_pod_event(&self, namespace: &str, pod: &str, event: CoreEvent) -> Result<()> {
        self.state
            .write()
            .map_err(poison_err)?
            .pod_events
            .entry(key(namespace, pod))
            .or_default()
            .push(event);
        Ok(())
    }

    /// Makes every subsequent write fail until reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_writes(&self, fail: bool) -> Result<()> {
        self.state.write().map_err(poison_err)?.fail_writes = fail;
        Ok(())
    }

    /// A stored source.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn source(&self, namespace: &str, name: &str) -> Result<Option<PreScaledCronJob>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.sources.get(&key(namespace, name)).cloned())
    }

    /// A stored cron job.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.cron_jobs.get(&key(namespace, name)).cloned())
    }

    /// Every write made so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn writes(&self) -> Result<Vec<Write>> {
        Ok(self.state.read().map_err(poison_err)?.writes.clone())
    }

    /// Every note published so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn notes(&self) -> Result<Vec<RecordedNote>> {
        Ok(self.state.read().map_err(poison_err)?.notes.clone())
    }
}

impl ClusterState {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(Error::cluster("writes are failing"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceStore for InMemoryCluster {
    async fn get_source(&self, namespace: &str, name: &str) -> Result<Option<PreScaledCronJob>> {
        self.source(namespace, name)
    }

    async fn add_finalizer(&self, source: &PreScaledCronJob, finalizer: &str) -> Result<()> {
        let key = object_key(source)?;
        let mut state = self.state.write().map_err(poison_err)?;
        state.check_writable()?;

        let stored = state
            .sources
            .get_mut(&key)
            .ok_or_else(|| Error::cluster(format!("source {} not found", key.1)))?;
        stored.finalizers_mut().push(finalizer.to_string());
        state.writes.push(Write::AddFinalizer {
            name: key.1,
            finalizer: finalizer.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl CronJobStore for InMemoryCluster {
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>> {
        self.cron_job(namespace, name)
    }

    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<()> {
        let key = object_key(cron_job)?;
        let mut state = self.state.write().map_err(poison_err)?;
        state.check_writable()?;

        if state.cron_jobs.contains_key(&key) {
            return Err(Error::cluster(format!("cron job {} already exists", key.1)));
        }
        state.writes.push(Write::CreateCronJob {
            name: key.1.clone(),
        });
        state.cron_jobs.insert(key, cron_job.clone());
        Ok(())
    }

    async fn replace_cron_job(&self, cron_job: &CronJob) -> Result<()> {
        let key = object_key(cron_job)?;
        let mut state = self.state.write().map_err(poison_err)?;
        state.check_writable()?;

        if !state.cron_jobs.contains_key(&key) {
            return Err(Error::cluster(format!("cron job {} not found", key.1)));
        }
        state.writes.push(Write::ReplaceCronJob {
            name: key.1.clone(),
        });
        state.cron_jobs.insert(key, cron_job.clone());
        Ok(())
    }
}

#[async_trait]
impl PodEventSource for InMemoryCluster {
    async fn list_pod_events(&self, namespace: &str, pod: &str) -> Result<Vec<LifecycleEvent>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .pod_events
            .get(&key(namespace, pod))
            .into_iter()
            .flatten()
            .cloned()
            .filter_map(lifecycle_event)
            .collect())
    }
}

#[async_trait]
impl Narrator for InMemoryCluster {
    async fn narrate(&self, source: &PreScaledCronJob, note: Note) {
        match self.state.write() {
            Ok(mut state) => state.notes.push(RecordedNote {
                source: source.name_any(),
                note,
            }),
            Err(_) => tracing::warn!("in-memory cluster lock poisoned, dropping note"),
        }
    }
}
