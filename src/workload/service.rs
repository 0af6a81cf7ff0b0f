//! Service builder

use k8s_openapi::api::core::v1::{Service as K8sService, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use super::{check_names, object_meta, selector_labels, workload_labels};
use crate::cluster::username_to_namespace;
use crate::platform::PlatformClient;
use crate::spec::PortMap;
use crate::{Error, LABEL_ROUTABLE};

/// Network endpoint paired 1:1 with a same-named [`super::Deployment`]
#[derive(Clone, Debug, PartialEq)]
pub struct Service {
    /// Service name, equal to its workload's name
    pub name: String,
    /// Owning user
    pub username: String,
    /// Target namespace
    pub namespace: String,
    /// Exposed ports
    pub ports: Vec<PortMap>,
}

impl Service {
    /// Build a service for `username`
    pub fn new(name: impl Into<String>, username: impl Into<String>, ports: Vec<PortMap>) -> Self {
        let username = username.into();
        Self {
            name: name.into(),
            namespace: username_to_namespace(&username),
            username,
            ports,
        }
    }

    /// Render the platform Service
    pub fn render(&self) -> Result<K8sService, Error> {
        check_names(&self.name, &self.namespace)?;

        let mut labels = workload_labels(&self.name, &self.username);
        labels.insert(LABEL_ROUTABLE.to_string(), "true".to_string());

        // A ClusterIP service needs at least one port; without any it is headless
        let (cluster_ip, ports) = if self.ports.is_empty() {
            (Some("None".to_string()), None)
        } else {
            let ports = self
                .ports
                .iter()
                .map(|p| ServicePort {
                    protocol: Some("TCP".to_string()),
                    port: i32::from(p.port),
                    target_port: Some(IntOrString::Int(i32::from(p.target_port))),
                    ..Default::default()
                })
                .collect();
            (None, Some(ports))
        };

        Ok(K8sService {
            metadata: object_meta(&self.name, &self.namespace, labels),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                cluster_ip,
                selector: Some(selector_labels(&self.name)),
                ports,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Render and create the Service in the user's namespace
    pub async fn submit(&self, platform: &dyn PlatformClient) -> Result<K8sService, Error> {
        let service = self.render()?;
        let created = platform
            .create_service(&self.namespace, service)
            .await
            .map_err(|e| Error::platform("create service error", e))?;
        debug!(namespace = %self.namespace, name = %self.name, "service created");
        Ok(created)
    }

    /// Hostname other workloads use to reach this service
    pub fn hostname(&self) -> String {
        hostname(&self.name, &self.namespace)
    }
}

/// Hostname of service `name` in `namespace`
pub fn hostname(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}")
}
