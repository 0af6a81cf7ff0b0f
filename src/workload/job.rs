//! Setup job builder

use std::collections::BTreeSet;

use k8s_openapi::api::batch::v1::{Job as K8sJob, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use super::{check_names, object_meta, render_env, workload_labels};
use crate::cluster::username_to_namespace;
use crate::config::Timing;
use crate::platform::PlatformClient;
use crate::spec::{EnvVar, SetupSpec};
use crate::Error;

/// Name of the one-shot setup job in every stack namespace
pub const SETUP_JOB_NAME: &str = "setup";

/// One-shot setup task run once per stack activation
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// Owning user
    pub username: String,
    /// Target namespace
    pub namespace: String,
    /// Container image
    pub image: String,
    /// Completion polling cadence and deadline
    pub timing: Timing,
    /// Container environment
    pub env: Vec<EnvVar>,
}

impl Job {
    /// Build the setup job for `username`
    ///
    /// The job sees its own env first, then every entry of `stack_env` whose
    /// name it has not already seen.
    pub fn new(
        username: impl Into<String>,
        setup: &SetupSpec,
        stack_env: impl IntoIterator<Item = EnvVar>,
    ) -> Self {
        let username = username.into();

        let mut seen = BTreeSet::new();
        let env = setup
            .env
            .iter()
            .cloned()
            .chain(stack_env)
            .filter(|var| seen.insert(var.name.clone()))
            .collect();

        Self {
            namespace: username_to_namespace(&username),
            username,
            image: setup.image.clone(),
            timing: setup.timing,
            env,
        }
    }

    /// Render the platform Job
    pub fn render(&self) -> Result<K8sJob, Error> {
        check_names(SETUP_JOB_NAME, &self.namespace)?;

        let labels = workload_labels(SETUP_JOB_NAME, &self.username);

        let container = Container {
            name: SETUP_JOB_NAME.to_string(),
            image: Some(self.image.clone()),
            env: render_env(&self.env),
            ..Default::default()
        };

        Ok(K8sJob {
            metadata: object_meta(SETUP_JOB_NAME, &self.namespace, labels.clone()),
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        restart_policy: Some("Never".to_string()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Render and create the Job in the user's namespace
    pub async fn submit(&self, platform: &dyn PlatformClient) -> Result<K8sJob, Error> {
        let job = self.render()?;
        let created = platform
            .create_job(&self.namespace, job)
            .await
            .map_err(|e| Error::platform("create job error", e))?;
        debug!(namespace = %self.namespace, "setup job created");
        Ok(created)
    }
}
