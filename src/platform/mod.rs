//! Platform collaborator
//!
//! The orchestrator only needs a handful of namespace-scoped calls against
//! four resource kinds. [`PlatformClient`] captures exactly those so the
//! orchestration logic can run against a live cluster ([`KubePlatform`]) or
//! entirely in process ([`InMemoryPlatform`]).

mod kubernetes;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Service};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use kubernetes::{create_client, KubePlatform};
pub use memory::InMemoryPlatform;

/// Error returned by a platform call
///
/// The message is the platform's own text and is surfaced unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// An object with the same name already exists
    #[error("{0}")]
    AlreadyExists(String),
    /// The object (or its namespace) does not exist
    #[error("{0}")]
    NotFound(String),
    /// Any other failure
    #[error("{0}")]
    Api(String),
}

impl ApiError {
    /// Create an AlreadyExists error in the platform's message format
    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::AlreadyExists(format!("{kind} \"{name}\" already exists"))
    }

    /// Create a NotFound error in the platform's message format
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound(format!("{kind} \"{name}\" not found"))
    }

    /// Whether the object was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the object already existed
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Namespace-scoped operations the orchestrator needs from the platform
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetch a namespace
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ApiError>;

    /// Create a namespace; `AlreadyExists` is the authoritative conflict signal
    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace, ApiError>;

    /// Delete a namespace and, by cascade, everything inside it
    async fn delete_namespace(&self, name: &str) -> Result<(), ApiError>;

    /// Create a Deployment
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: Deployment,
    ) -> Result<Deployment, ApiError>;

    /// Fetch a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ApiError>;

    /// Create a Service
    async fn create_service(&self, namespace: &str, service: Service) -> Result<Service, ApiError>;

    /// List Services matching an equality label selector (`k=v[,k=v]`)
    async fn list_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Service>, ApiError>;

    /// Create a Job
    async fn create_job(&self, namespace: &str, job: Job) -> Result<Job, ApiError>;

    /// Fetch a Job
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ApiError>;
}

/// Parse an equality label selector (`k=v[,k=v]`) into its requirements
///
/// An empty selector matches everything.
pub fn parse_label_selector(selector: &str) -> Result<BTreeMap<String, String>, ApiError> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| ApiError::Api(format!("unable to parse requirement: {term:?}")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ApiError::Api(format!("unable to parse requirement: {term:?}")));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Whether `labels` satisfies every requirement in `selector`
pub fn matches_selector(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector.iter().all(|(key, value)| {
        labels
            .and_then(|labels| labels.get(key))
            .is_some_and(|actual| actual == value)
    })
}
