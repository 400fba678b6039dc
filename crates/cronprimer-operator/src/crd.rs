//! The `PreScaledCronJob` custom resource.

use k8s_openapi::api::batch::v1::CronJob;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A CronJob that should start `warmUpTimeMins` early with a warm-up step.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "psc.cronprimer.local",
    version = "v1alpha1",
    kind = "PreScaledCronJob",
    plural = "prescaledcronjobs",
    shortname = "psc",
    namespaced,
    status = "PreScaledCronJobStatus",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.cronJob.spec.schedule"}"#,
    printcolumn = r#"{"name":"WarmUp","type":"integer","jsonPath":".spec.warmUpTimeMins"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PreScaledCronJobSpec {
    /// Minutes the warm-up step runs ahead of the schedule.
    #[serde(default)]
    pub warm_up_time_mins: u32,

    /// Explicit schedule for the derived job; replaces the computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primer_schedule: Option<String>,

    /// The job to run.
    pub cron_job: CronJob,
}

/// Observed state. Currently empty.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct PreScaledCronJobStatus {}

impl PreScaledCronJob {
    /// The schedule the user wants the workload to run on.
    #[must_use]
    pub fn original_schedule(&self) -> &str {
        self.spec
            .cron_job
            .spec
            .as_ref()
            .map_or("", |spec| spec.schedule.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};
    use serde_json::json;

    #[test]
    fn crd_identity() {
        let crd = PreScaledCronJob::crd();
        assert_eq!(crd.spec.group, "psc.cronprimer.local");
        assert_eq!(crd.spec.names.kind, "PreScaledCronJob");
        assert_eq!(PreScaledCronJob::api_version(&()), "psc.cronprimer.local/v1alpha1");
    }

    #[test]
    fn deserializes_user_manifest() {
        let psc: PreScaledCronJob = serde_json::from_value(json!({
            "apiVersion": "psc.cronprimer.local/v1alpha1",
            "kind": "PreScaledCronJob",
            "metadata": { "name": "nightly", "namespace": "jobs" },
            "spec": {
                "warmUpTimeMins": 10,
                "cronJob": {
                    "spec": {
                        "schedule": "0 0 * * *",
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
        .unwrap();

        assert_eq!(psc.spec.warm_up_time_mins, 10);
        assert_eq!(psc.spec.primer_schedule, None);
        assert_eq!(psc.original_schedule(), "0 0 * * *");
    }

    #[test]
    fn warm_up_defaults_to_zero() {
        let spec: PreScaledCronJobSpec = serde_json::from_value(json!({ "cronJob": {} })).unwrap();
        assert_eq!(spec.warm_up_time_mins, 0);
        assert!(spec.cron_job.spec.is_none());
    }
}
