//! kube-rs backed platform client

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use super::{ApiError, PlatformClient};
use crate::config::DEFAULT_FIELD_MANAGER;
use crate::Error;

/// Connection timeout for the API server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for API calls
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path
///
/// Without a path the configuration is inferred (in-cluster service account
/// or the user's default kubeconfig).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::platform("create client error", format!("failed to read kubeconfig: {e}"))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::platform("create client error", format!("failed to load kubeconfig: {e}"))
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::platform("create client error", format!("failed to infer config: {e}"))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::platform("create client error", format!("failed to create client: {e}"))
    })
}

/// Platform client talking to a real Kubernetes API server
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
    field_manager: String,
}

impl KubePlatform {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }

    /// Record a different field manager on created objects
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => ApiError::AlreadyExists(resp.message),
            kube::Error::Api(resp) if resp.code == 404 => ApiError::NotFound(resp.message),
            kube::Error::Api(resp) => ApiError::Api(resp.message),
            other => ApiError::Api(other.to_string()),
        }
    }
}

#[async_trait]
impl PlatformClient for KubePlatform {
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ApiError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace, ApiError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.create(&self.post_params(), &namespace).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ApiError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::foreground()).await?;
        debug!(namespace = %name, "namespace deletion accepted");
        Ok(())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> Result<Deployment, ApiError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&self.post_params(), &deployment).await?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ApiError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, ApiError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&self.post_params(), &service).await?)
    }

    async fn list_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Service>, ApiError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(list.items)
    }

    async fn create_job(&self, namespace: &str, job: Job) -> Result<Job, ApiError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&self.post_params(), &job).await?)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ApiError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
