//! Generation of the derived `CronJob` for a `PreScaledCronJob`.
//!
//! The derived job is the user's job with three changes: it runs on the
//! primer schedule, a warm-up init container that sleeps until the original
//! schedule is prepended to its pods, and its pods carry a label naming the
//! source so their events can be traced back.

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Container, EnvVar};
use kube::{Resource, ResourceExt};

use cronprimer_core::fingerprint::fingerprint;
use cronprimer_core::schedule::{primer_schedule, ShiftRejection};

use crate::crd::PreScaledCronJob;
use crate::error::{Error, Result};

/// Annotation holding the fingerprint of the generated object.
pub const OBJECT_HASH_ANNOTATION: &str = "pscObjectHash";

/// Finalizer that makes the platform delete dependents before the source.
pub const CASCADE_FINALIZER: &str = "foregroundDeletion";

/// Pod label naming the source a workload instance belongs to.
pub const PRIMED_CRON_LABEL: &str = "primedcron";

/// Reserved name of the injected warm-up init container.
pub const WARMUP_CONTAINER_NAME: &str = "injected-0d825b4f-07f0-4952-8150-fba894c613b1";

const DERIVED_NAME_PREFIX: &str = "autogen-";

/// Name of the derived job for the source named `source_name`.
#[must_use]
pub fn derived_name(source_name: &str) -> String {
    format!("{DERIVED_NAME_PREFIX}{source_name}")
}

/// Schedule the derived job of `source` should run on.
///
/// # Errors
///
/// Returns the [`ShiftRejection`] when no primer schedule can be derived.
pub fn primer_schedule_for(source: &PreScaledCronJob) -> std::result::Result<String, ShiftRejection> {
    primer_schedule(
        source.original_schedule(),
        source.spec.warm_up_time_mins,
        source.spec.primer_schedule.as_deref(),
    )
}

/// A generated job and the fingerprint stamped on it.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedJob {
    /// The object to create, annotated with its fingerprint.
    pub cron_job: CronJob,
    /// Fingerprint of the object before annotation.
    pub fingerprint: String,
    /// User-supplied controller references (`kind/name`) that were dropped
    /// in favour of the source.
    pub displaced_controllers: Vec<String>,
}

impl DerivedJob {
    /// Name of the derived object.
    #[must_use]
    pub fn name(&self) -> String {
        self.cron_job.name_any()
    }
}

/// Builds the derived job for `source` on `primer`, injecting a warm-up
/// container running `warmup_image`.
///
/// # Errors
///
/// Returns [`Error::MissingField`] if `source` has no name, namespace or UID,
/// and a core error if the object cannot be fingerprinted.
pub fn build(source: &PreScaledCronJob, primer: &str, warmup_image: &str) -> Result<DerivedJob> {
    let source_name = source
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::missing("PreScaledCronJob", "", "name"))?;
    let namespace = source
        .namespace()
        .ok_or_else(|| Error::missing("PreScaledCronJob", &source_name, "namespace"))?;
    let mut owner = source
        .controller_owner_ref(&())
        .ok_or_else(|| Error::missing("PreScaledCronJob", &source_name, "uid"))?;
    owner.block_owner_deletion = Some(true);

    let mut cron_job = source.spec.cron_job.clone();
    cron_job.status = None;
    cron_job.metadata.name = Some(derived_name(&source_name));
    cron_job.metadata.namespace = Some(namespace.clone());

    // At most one owner reference may be the controller.
    let mut displaced_controllers = Vec::new();
    cron_job.owner_references_mut().retain(|r| {
        if r.controller == Some(true) {
            displaced_controllers.push(format!("{}/{}", r.kind, r.name));
            false
        } else {
            true
        }
    });
    cron_job.owner_references_mut().push(owner);

    let spec = cron_job.spec.get_or_insert_with(Default::default);
    let original = std::mem::replace(&mut spec.schedule, primer.to_string());

    let template = &mut spec
        .job_template
        .spec
        .get_or_insert_with(Default::default)
        .template;
    template
        .metadata
        .get_or_insert_with(Default::default)
        .labels
        .get_or_insert_with(Default::default)
        .insert(PRIMED_CRON_LABEL.to_string(), source_name);

    let pod_spec = template.spec.get_or_insert_with(Default::default);
    pod_spec
        .init_containers
        .get_or_insert_with(Vec::new)
        .insert(0, warmup_container(warmup_image, &namespace, &original));

    let fingerprint = fingerprint(&cron_job)?;
    cron_job
        .annotations_mut()
        .insert(OBJECT_HASH_ANNOTATION.to_string(), fingerprint.clone());

    Ok(DerivedJob {
        cron_job,
        fingerprint,
        displaced_controllers,
    })
}

fn warmup_container(image: &str, namespace: &str, original_schedule: &str) -> Container {
    let env = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    };
    Container {
        name: WARMUP_CONTAINER_NAME.to_string(),
        image: Some(image.to_string()),
        env: Some(vec![
            env("NAMESPACE", namespace),
            env("CRONJOB_SCHEDULE", original_schedule),
        ]),
        ..Container::default()
    }
}

/// Fingerprint stamped on an existing object, if any.
#[must_use]
pub fn stamped_fingerprint(cron_job: &CronJob) -> Option<&str> {
    cron_job
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(OBJECT_HASH_ANNOTATION))
        .map(String::as_str)
}

/// True when `cron_job` names `source` among its owners by UID.
#[must_use]
pub fn is_owned_by(cron_job: &CronJob, source: &PreScaledCronJob) -> bool {
    let Some(uid) = source.uid() else {
        return false;
    };
    cron_job.owner_references().iter().any(|r| r.uid == uid)
}
