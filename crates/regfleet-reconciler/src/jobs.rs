//! Scheduled copy-tool jobs for cron-triggered replication.
//!
//! Each copy-tool rule becomes a `ConfigMap` listing the source repositories
//! and a `CronJob` that loops over them with the copy tool.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, Container, EnvFromSource, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use regfleet_core::{Registry, ReplicationDirection, ReplicationRule, ReplicationType, Repository};

use crate::copy_tool::{sync_script, DEFAULT_IMAGE, REPOSITORIES_VAR};
use crate::error::{ReconcileError, Result};
use crate::manipulator::ManagedResource;

/// Value of the `generator` label on generated resources.
pub const GENERATOR: &str = "regfleet-copy-tool";

/// Label keys of generated resources.
pub const GENERATOR_LABEL: &str = "generator";
/// Project label key.
pub const PROJECT_LABEL: &str = "project";
/// Remote registry label key.
pub const REMOTE_REGISTRY_LABEL: &str = "remote-registry";

/// Kubernetes object names are limited to 63 characters, cron jobs to 52.
const MAX_CRON_JOB_NAME: usize = 52;

/// Settings of generated jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Container image providing the copy tool.
    pub image: String,
    /// Namespace of generated objects, if fixed.
    pub namespace: Option<String>,
    /// Seconds a missed schedule may still start.
    pub starting_deadline_seconds: i64,
    /// Retries of a failed job run.
    pub backoff_limit: i32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            namespace: None,
            starting_deadline_seconds: 200,
            backoff_limit: 1,
        }
    }
}

impl JobConfig {
    /// Sets the copy-tool image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the namespace of generated objects.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// The objects implementing one copy-tool rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationJob {
    /// Repository list consumed by the job.
    pub config_map: ConfigMap,
    /// The scheduled job.
    pub cron_job: CronJob,
}

impl ReplicationJob {
    /// Returns the objects in the order they must be written.
    pub fn resources(&self) -> [ManagedResource; 2] {
        [
            ManagedResource::ConfigMap(self.config_map.clone()),
            ManagedResource::CronJob(self.cron_job.clone()),
        ]
    }

    /// Name-only objects identifying the job of a rule, for removal.
    ///
    /// Removal order is the reverse of [`resources`](Self::resources).
    pub fn identity(rule: &ReplicationRule, config: &JobConfig) -> [ManagedResource; 2] {
        let (job, config_map) = resource_names(rule);
        [
            ManagedResource::CronJob(CronJob {
                metadata: metadata(job, config, BTreeMap::new()),
                ..CronJob::default()
            }),
            ManagedResource::ConfigMap(ConfigMap {
                metadata: metadata(config_map, config, BTreeMap::new()),
                ..ConfigMap::default()
            }),
        ]
    }
}

/// Lowercases `value` and replaces everything outside `[a-z0-9-]` so it is a
/// valid object name of at most `max` characters.
fn dns_label(value: &str, max: usize) -> String {
    let mapped: String = value
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('-');
    trimmed
        .chars()
        .take(max)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Cron job and config map names of a rule.
///
/// The remote registry is part of the name so rules of one project towards
/// different registries do not collide.
pub fn resource_names(rule: &ReplicationRule) -> (String, String) {
    let base = format!("{}-{}", rule.project, rule.remote_registry);
    let base = dns_label(&base, MAX_CRON_JOB_NAME - "-job".len());
    (format!("{base}-job"), format!("{base}-cm"))
}

fn labels(rule: &ReplicationRule) -> BTreeMap<String, String> {
    BTreeMap::from([
        (GENERATOR_LABEL.to_string(), GENERATOR.to_string()),
        (PROJECT_LABEL.to_string(), rule.project.clone()),
        (REMOTE_REGISTRY_LABEL.to_string(), rule.remote_registry.clone()),
    ])
}

fn metadata(name: String, config: &JobConfig, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: config.namespace.clone(),
        labels: (!labels.is_empty()).then_some(labels),
        ..ObjectMeta::default()
    }
}

/// Returns the (source, destination) registries of a rule.
///
/// `local` is the registry the rule is configured on.
pub fn endpoints<'a>(
    rule: &ReplicationRule,
    local: &'a Registry,
    remote: &'a Registry,
) -> (&'a Registry, &'a Registry) {
    match rule.direction {
        ReplicationDirection::Push => (local, remote),
        ReplicationDirection::Pull => (remote, local),
    }
}

/// Builds the copy-tool job of a rule.
///
/// `repositories` are the source project's repositories, named with their
/// project prefix.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidConfig`] if the rule does not use the
/// copy tool or its trigger has no cron schedule.
pub fn build_replication_job(
    rule: &ReplicationRule,
    source: &Registry,
    destination: &Registry,
    repositories: &[Repository],
    config: &JobConfig,
) -> Result<ReplicationJob> {
    if rule.transport != ReplicationType::CopyTool {
        return Err(ReconcileError::invalid_config(format!(
            "rule for {} on {} uses native replication, not the copy tool",
            rule.project, rule.local_registry
        )));
    }
    let schedule = rule.trigger.schedule().ok_or_else(|| {
        ReconcileError::invalid_config(format!(
            "trigger '{}' of {} has no cron schedule",
            rule.trigger, rule.project
        ))
    })?;

    let (job_name, config_map_name) = resource_names(rule);
    let labels = labels(rule);

    let sources: Vec<String> = repositories
        .iter()
        .map(|r| format!("{}/{}", source.host(), r.name))
        .collect();
    let config_map = ConfigMap {
        metadata: metadata(config_map_name.clone(), config, labels.clone()),
        data: Some(BTreeMap::from([(
            REPOSITORIES_VAR.to_string(),
            sources.join(" "),
        )])),
        ..ConfigMap::default()
    };

    let script = sync_script(
        source.credentials(),
        &format!("{}/{}", destination.host(), rule.project),
        destination.credentials(),
    )?;
    let container = Container {
        name: job_name.clone(),
        image: Some(config.image.clone()),
        command: Some(vec!["/bin/bash".to_string()]),
        args: Some(vec!["-c".to_string(), script]),
        image_pull_policy: Some("Always".to_string()),
        env_from: Some(vec![EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: config_map_name.into(),
                ..ConfigMapEnvSource::default()
            }),
            ..EnvFromSource::default()
        }]),
        ..Container::default()
    };

    let cron_job = CronJob {
        metadata: metadata(job_name, config, labels),
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            starting_deadline_seconds: Some(config.starting_deadline_seconds),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    backoff_limit: Some(config.backoff_limit),
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            containers: vec![container],
                            restart_policy: Some("Never".to_string()),
                            ..PodSpec::default()
                        }),
                        ..PodTemplateSpec::default()
                    },
                    ..JobSpec::default()
                }),
                ..JobTemplateSpec::default()
            },
            ..CronJobSpec::default()
        }),
        ..CronJob::default()
    };

    Ok(ReplicationJob {
        config_map,
        cron_job,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry;
    use regfleet_core::ReplicationTrigger;

    fn rule(transport: ReplicationType, trigger: &str) -> ReplicationRule {
        ReplicationRule {
            project: "os-images".to_string(),
            local_registry: "hub".to_string(),
            remote_registry: "edge".to_string(),
            direction: ReplicationDirection::Push,
            trigger: ReplicationTrigger::new(trigger),
            transport,
        }
    }

    fn job() -> ReplicationJob {
        build_replication_job(
            &rule(ReplicationType::CopyTool, "cron 0 3 * * *"),
            &registry("hub", false),
            &registry("edge", false),
            &[
                Repository::new("os-images", "os-images/alpine"),
                Repository::new("os-images", "os-images/base/debian"),
            ],
            &JobConfig::default().with_namespace("regfleet"),
        )
        .unwrap()
    }

    #[test]
    fn test_config_map_lists_source_repositories() {
        let job = job();
        assert_eq!(job.config_map.metadata.name.as_deref(), Some("os-images-edge-cm"));
        assert_eq!(job.config_map.metadata.namespace.as_deref(), Some("regfleet"));
        assert_eq!(
            job.config_map.data.unwrap()[REPOSITORIES_VAR],
            "hub.example.com/os-images/alpine hub.example.com/os-images/base/debian"
        );
    }

    #[test]
    fn test_cron_job_shape() {
        let job = job();
        let labels = job.cron_job.metadata.labels.clone().unwrap();
        assert_eq!(labels[GENERATOR_LABEL], GENERATOR);
        assert_eq!(labels[PROJECT_LABEL], "os-images");
        assert_eq!(labels[REMOTE_REGISTRY_LABEL], "edge");

        let spec = job.cron_job.spec.unwrap();
        assert_eq!(spec.schedule, "0 3 * * *");
        assert_eq!(spec.concurrency_policy.as_deref(), Some("Forbid"));
        assert_eq!(spec.starting_deadline_seconds, Some(200));

        let job_spec = spec.job_template.spec.unwrap();
        assert_eq!(job_spec.backoff_limit, Some(1));
        let pod = job_spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        let container = &pod.containers[0];
        assert_eq!(container.name, "os-images-edge-job");
        assert_eq!(container.image.as_deref(), Some(DEFAULT_IMAGE));
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(container.command.as_deref(), Some(&["/bin/bash".to_string()][..]));
        let args = container.args.clone().unwrap();
        assert_eq!(args[0], "-c");
        assert!(args[1].contains("\"$repo\" edge.example.com/os-images"));
        assert!(args[1].contains("--src-creds admin:pw --dest-creds admin:pw"));
    }

    #[test]
    fn test_job_serializes_as_batch_v1() {
        let value = serde_json::to_value(job().cron_job).unwrap();
        assert_eq!(value["apiVersion"], "batch/v1");
        assert_eq!(value["kind"], "CronJob");
        assert_eq!(
            value["spec"]["jobTemplate"]["spec"]["template"]["spec"]["containers"][0]["envFrom"][0]
                ["configMapRef"]["name"],
            "os-images-edge-cm"
        );
    }

    #[test]
    fn test_native_rule_is_rejected() {
        let err = build_replication_job(
            &rule(ReplicationType::Registry, "manual"),
            &registry("hub", false),
            &registry("edge", false),
            &[],
            &JobConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidConfig { .. }));
    }

    #[test]
    fn test_copy_tool_rule_without_schedule_is_rejected() {
        let err = build_replication_job(
            &rule(ReplicationType::CopyTool, "cron"),
            &registry("hub", false),
            &registry("edge", false),
            &[],
            &JobConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidConfig { .. }));
    }

    #[test]
    fn test_pull_rule_reverses_endpoints() {
        let hub = registry("hub", false);
        let edge = registry("edge", false);
        let mut pull = rule(ReplicationType::CopyTool, "cron */10 * * * *");
        pull.direction = ReplicationDirection::Pull;
        let (source, destination) = endpoints(&pull, &edge, &hub);
        assert_eq!(source.name(), "hub");
        assert_eq!(destination.name(), "edge");
    }

    #[test]
    fn test_resource_names_are_valid() {
        let mut odd = rule(ReplicationType::CopyTool, "cron * * * * *");
        odd.project = "OS_Images".to_string();
        odd.remote_registry = "Edge.Registry".to_string();
        assert_eq!(
            resource_names(&odd),
            ("os-images-edge-registry-job".to_string(), "os-images-edge-registry-cm".to_string())
        );

        odd.project = "x".repeat(80);
        let (job, _) = resource_names(&odd);
        assert!(job.len() <= MAX_CRON_JOB_NAME);
        assert!(job.ends_with("-job"));
    }

    #[test]
    fn test_identity_names_match_job() {
        let built = job();
        let identity = ReplicationJob::identity(
            &rule(ReplicationType::CopyTool, "cron 0 3 * * *"),
            &JobConfig::default().with_namespace("regfleet"),
        );
        assert_eq!(identity[0].name(), built.cron_job.metadata.name.as_deref().unwrap());
        assert_eq!(identity[1].name(), built.config_map.metadata.name.as_deref().unwrap());
    }
}
