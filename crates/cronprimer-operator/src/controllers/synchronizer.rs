//! Keeps each `PreScaledCronJob`'s derived `CronJob` in step with it.
//!
//! One pass:
//!
//! ```text
//! get source ─► finalizer guard ─► shift schedule ─► build + fingerprint
//!            ─► get derived ─► create | refuse (not ours) | skip (same hash) | replace
//! ```
//!
//! Passes are idempotent: with nothing changed, a second pass makes no write.

use k8s_openapi::api::batch::v1::CronJob;
use kube::ResourceExt;
use tracing::Instrument;

use cronprimer_core::metrics::{CronAction, PrimerMetrics};
use cronprimer_core::observability::sync_span;
use cronprimer_core::schedule::ShiftRejection;

use crate::cluster::{CronJobStore, Narrator, Note, SourceStore};
use crate::crd::PreScaledCronJob;
use crate::derived::{self, DerivedJob, CASCADE_FINALIZER};
use crate::error::{Error, Result};

/// Settings shared by every synchronizer pass.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Image of the injected warm-up container.
    pub warmup_image: String,
    /// Metrics recorder.
    pub metrics: PrimerMetrics,
}

/// What a synchronizer pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The source no longer exists.
    SourceMissing,
    /// The cascade finalizer was added; the next pass continues.
    FinalizerAdded,
    /// The source is being deleted; dependents are left to the platform.
    Deleting,
    /// No primer schedule can be derived from the source.
    Rejected(ShiftRejection),
    /// A cron job with the derived name exists but belongs to someone else.
    OwnershipConflict,
    /// The derived job was created.
    Created,
    /// The derived job was replaced.
    Updated,
    /// The derived job already matches.
    Unchanged,
}

/// Runs one synchronizer pass for the source `namespace/name`.
///
/// # Errors
///
/// Returns an error when a cluster call fails; rejections and conflicts are
/// outcomes, not errors.
pub async fn sync_source<C>(
    cluster: &C,
    settings: &SyncSettings,
    namespace: &str,
    name: &str,
) -> Result<SyncOutcome>
where
    C: SourceStore + CronJobStore + Narrator,
{
    sync(cluster, settings, namespace, name)
        .instrument(sync_span(namespace, name))
        .await
}

async fn sync<C>(
    cluster: &C,
    settings: &SyncSettings,
    namespace: &str,
    name: &str,
) -> Result<SyncOutcome>
where
    C: SourceStore + CronJobStore + Narrator,
{
    let Some(source) = cluster.get_source(namespace, name).await? else {
        tracing::debug!("source not found, nothing to do");
        return Ok(SyncOutcome::SourceMissing);
    };

    if source.metadata.deletion_timestamp.is_some() {
        tracing::debug!("source is being deleted");
        return Ok(SyncOutcome::Deleting);
    }

    if !source.finalizers().iter().any(|f| f == CASCADE_FINALIZER) {
        return add_finalizer(cluster, settings, &source).await;
    }

    let primer = match derived::primer_schedule_for(&source) {
        Ok(primer) => primer,
        Err(rejection) => {
            tracing::warn!(reason = %rejection, "cannot derive primer schedule");
            cluster
                .narrate(
                    &source,
                    Note::warning(
                        "Invalid cron schedule",
                        format!("Failed to generate cronjob: {rejection}"),
                    ),
                )
                .await;
            return Ok(SyncOutcome::Rejected(rejection));
        }
    };

    let desired = derived::build(&source, &primer, &settings.warmup_image)?;
    let derived_name = desired.name();

    match cluster.get_cron_job(namespace, &derived_name).await? {
        None => create(cluster, settings, &source, desired).await,
        Some(existing) => update(cluster, settings, &source, existing, desired).await,
    }
}

async fn add_finalizer<C>(
    cluster: &C,
    settings: &SyncSettings,
    source: &PreScaledCronJob,
) -> Result<SyncOutcome>
where
    C: SourceStore + Narrator,
{
    tracing::info!(finalizer = CASCADE_FINALIZER, "adding finalizer");
    let result = cluster.add_finalizer(source, CASCADE_FINALIZER).await;
    settings
        .metrics
        .record_cron_action(CronAction::Delete, result.is_ok());

    match result {
        Ok(()) => {
            cluster
                .narrate(source, Note::normal("Adding finalizer", "Object finalizer is added"))
                .await;
            Ok(SyncOutcome::FinalizerAdded)
        }
        Err(error) => {
            narrate_failure(cluster, source, "Adding finalizer", "add finalizer", &error).await;
            Err(error)
        }
    }
}

async fn create<C>(
    cluster: &C,
    settings: &SyncSettings,
    source: &PreScaledCronJob,
    desired: DerivedJob,
) -> Result<SyncOutcome>
where
    C: CronJobStore + Narrator,
{
    let name = desired.name();
    for owner in &desired.displaced_controllers {
        tracing::warn!(cronjob = %name, %owner, "replacing controller reference from template");
        cluster
            .narrate(
                source,
                Note::warning(
                    "Owner reference replaced",
                    format!("Controller reference {owner} in the cronJob template was replaced by this PreScaledCronJob"),
                ),
            )
            .await;
    }

    tracing::info!(cronjob = %name, "creating derived cronjob");
    let result = cluster.create_cron_job(&desired.cron_job).await;
    settings
        .metrics
        .record_cron_action(CronAction::Create, result.is_ok());

    match result {
        Ok(()) => {
            cluster
                .narrate(
                    source,
                    Note::normal(
                        "Create cronjob successful",
                        format!("Created associated cronjob: {name}"),
                    ),
                )
                .await;
            Ok(SyncOutcome::Created)
        }
        Err(error) => {
            narrate_failure(cluster, source, "Create cronjob failed", "create cronjob", &error)
                .await;
            Err(error)
        }
    }
}

async fn update<C>(
    cluster: &C,
    settings: &SyncSettings,
    source: &PreScaledCronJob,
    mut existing: CronJob,
    desired: DerivedJob,
) -> Result<SyncOutcome>
where
    C: CronJobStore + Narrator,
{
    let name = existing.name_any();

    if !derived::is_owned_by(&existing, source) {
        tracing::info!(cronjob = %name, "cronjob exists and was not created by this operator");
        cluster
            .narrate(
                source,
                Note::warning(
                    "Cronjob already exists",
                    format!(
                        "A cronjob with this name already exists, and was not created by this operator: {name}"
                    ),
                ),
            )
            .await;
        return Ok(SyncOutcome::OwnershipConflict);
    }

    if derived::stamped_fingerprint(&existing) == Some(desired.fingerprint.as_str()) {
        tracing::debug!(cronjob = %name, "derived cronjob unchanged");
        return Ok(SyncOutcome::Unchanged);
    }

    tracing::info!(cronjob = %name, "updating derived cronjob");
    existing.spec = desired.cron_job.spec;
    existing
        .annotations_mut()
        .insert(derived::OBJECT_HASH_ANNOTATION.to_string(), desired.fingerprint);

    let result = cluster.replace_cron_job(&existing).await;
    settings
        .metrics
        .record_cron_action(CronAction::Update, result.is_ok());

    match result {
        Ok(()) => {
            cluster
                .narrate(
                    source,
                    Note::normal(
                        "Update of cronjob successful",
                        format!("Updated associated cronjob: {name}"),
                    ),
                )
                .await;
            Ok(SyncOutcome::Updated)
        }
        Err(error) => {
            narrate_failure(cluster, source, "Update of cronjob failed", "update cronjob", &error)
                .await;
            Err(error)
        }
    }
}

async fn narrate_failure<C: Narrator>(
    cluster: &C,
    source: &PreScaledCronJob,
    reason: &str,
    action: &str,
    error: &Error,
) {
    tracing::error!(error = %error, "failed to {action}");
    cluster
        .narrate(source, Note::warning(reason, format!("Failed to {action}: {error}")))
        .await;
}
