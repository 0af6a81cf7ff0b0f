//! Deployment builder

use k8s_openapi::api::apps::v1::{Deployment as K8sDeployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, ExecAction, PodSpec, PodTemplateSpec, Probe,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tracing::debug;

use super::{check_names, object_meta, render_env, selector_labels, workload_labels};
use crate::cluster::username_to_namespace;
use crate::platform::PlatformClient;
use crate::spec::{EnvVar, PortMap, ProbeSpec, WorkloadSpec};
use crate::Error;

/// One long-running workload in a user's namespace
#[derive(Clone, Debug, PartialEq)]
pub struct Deployment {
    /// Workload name, also the name of its paired Service
    pub name: String,
    /// Owning user
    pub username: String,
    /// Target namespace
    pub namespace: String,
    /// Container image
    pub image: String,
    /// Port mappings; the container exposes the target ports
    pub ports: Vec<PortMap>,
    /// Container environment
    pub env: Vec<EnvVar>,
    /// Readiness probe, present only for services that declare one
    pub probe: Option<ProbeSpec>,
}

impl Deployment {
    /// Build a deployment for `username` from a workload entry
    pub fn new(name: impl Into<String>, username: impl Into<String>, spec: &WorkloadSpec) -> Self {
        let username = username.into();
        Self {
            name: name.into(),
            namespace: username_to_namespace(&username),
            username,
            image: spec.image.clone(),
            ports: spec.ports.clone(),
            env: spec.env.clone(),
            probe: spec.readiness_probe.clone(),
        }
    }

    /// Render the platform Deployment
    pub fn render(&self) -> Result<K8sDeployment, Error> {
        check_names(&self.name, &self.namespace)?;

        let labels = workload_labels(&self.name, &self.username);

        let ports = if self.ports.is_empty() {
            None
        } else {
            Some(
                self.ports
                    .iter()
                    .map(|p| ContainerPort {
                        container_port: i32::from(p.target_port),
                        ..Default::default()
                    })
                    .collect(),
            )
        };

        let container = Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            ports,
            env: render_env(&self.env),
            readiness_probe: self.probe.as_ref().map(render_probe),
            ..Default::default()
        };

        Ok(K8sDeployment {
            metadata: object_meta(&self.name, &self.namespace, labels.clone()),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(&self.name)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Render and create the Deployment in the user's namespace
    pub async fn submit(&self, platform: &dyn PlatformClient) -> Result<K8sDeployment, Error> {
        let deployment = self.render()?;
        let created = platform
            .create_deployment(&self.namespace, deployment)
            .await
            .map_err(|e| Error::platform("create deployment error", e))?;
        debug!(namespace = %self.namespace, name = %self.name, "deployment created");
        Ok(created)
    }
}

fn render_probe(probe: &ProbeSpec) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(probe.command.clone()),
        }),
        period_seconds: (probe.timing.period_seconds > 0)
            .then(|| i32::try_from(probe.timing.period_seconds).unwrap_or(i32::MAX)),
        ..Default::default()
    }
}
