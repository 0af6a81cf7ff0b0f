//! In-process platform
//!
//! Keeps namespaces and their contents in memory with the semantics the
//! orchestrator relies on: objects live inside a namespace, names are unique
//! per kind, namespace deletion cascades, and lists honour label selectors.
//! Unless built with [`InMemoryPlatform::with_pending_workloads`], created
//! Deployments immediately report every replica ready and Jobs report
//! `Complete`, so readiness waits succeed on their first check.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus, Service};
use parking_lot::Mutex;

use super::{matches_selector, parse_label_selector, ApiError, PlatformClient};

const NAMESPACES: &str = "namespaces";
const DEPLOYMENTS: &str = "deployments.apps";
const SERVICES: &str = "services";
const JOBS: &str = "jobs.batch";

#[derive(Default)]
struct NamespaceState {
    namespace: Namespace,
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,
    jobs: BTreeMap<String, Job>,
}

/// Platform client backed by process memory
pub struct InMemoryPlatform {
    namespaces: Mutex<BTreeMap<String, NamespaceState>>,
    ready_workloads: bool,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    /// Create an empty platform whose workloads become ready immediately
    pub fn new() -> Self {
        Self {
            namespaces: Mutex::new(BTreeMap::new()),
            ready_workloads: true,
        }
    }

    /// Keep created Deployments unready and Jobs incomplete
    pub fn with_pending_workloads(mut self) -> Self {
        self.ready_workloads = false;
        self
    }

    /// Names of all namespaces, sorted
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.lock().keys().cloned().collect()
    }

    /// Whether a namespace exists
    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.lock().contains_key(name)
    }

    /// Deployments in a namespace, sorted by name
    pub fn deployments(&self, namespace: &str) -> Vec<Deployment> {
        self.namespaces
            .lock()
            .get(namespace)
            .map(|state| state.deployments.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Services in a namespace, sorted by name
    pub fn services(&self, namespace: &str) -> Vec<Service> {
        self.namespaces
            .lock()
            .get(namespace)
            .map(|state| state.services.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Jobs in a namespace, sorted by name
    pub fn jobs(&self, namespace: &str) -> Vec<Job> {
        self.namespaces
            .lock()
            .get(namespace)
            .map(|state| state.jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Overwrite a Job's status; returns false if the Job does not exist
    pub fn set_job_status(&self, namespace: &str, name: &str, status: JobStatus) -> bool {
        let mut namespaces = self.namespaces.lock();
        match namespaces
            .get_mut(namespace)
            .and_then(|state| state.jobs.get_mut(name))
        {
            Some(job) => {
                job.status = Some(status);
                true
            }
            None => false,
        }
    }

    /// Mark every replica of a Deployment ready; returns false if it does not exist
    pub fn mark_deployment_ready(&self, namespace: &str, name: &str) -> bool {
        let mut namespaces = self.namespaces.lock();
        match namespaces
            .get_mut(namespace)
            .and_then(|state| state.deployments.get_mut(name))
        {
            Some(deployment) => {
                deployment.status = Some(ready_deployment_status(deployment));
                true
            }
            None => false,
        }
    }

    fn with_namespace<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&mut NamespaceState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut namespaces = self.namespaces.lock();
        let state = namespaces
            .get_mut(namespace)
            .ok_or_else(|| ApiError::not_found(NAMESPACES, namespace))?;
        f(state)
    }
}

fn object_name(name: Option<&String>) -> Result<String, ApiError> {
    match name {
        Some(name) if !name.is_empty() => Ok(name.clone()),
        _ => Err(ApiError::Api("resource name may not be empty".to_string())),
    }
}

fn ready_deployment_status(deployment: &Deployment) -> DeploymentStatus {
    let replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: Some(replicas),
        available_replicas: Some(replicas),
        updated_replicas: Some(replicas),
        ..Default::default()
    }
}

fn complete_job_status() -> JobStatus {
    JobStatus {
        succeeded: Some(1),
        conditions: Some(vec![JobCondition {
            type_: "Complete".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ApiError> {
        self.namespaces
            .lock()
            .get(name)
            .map(|state| state.namespace.clone())
            .ok_or_else(|| ApiError::not_found(NAMESPACES, name))
    }

    async fn create_namespace(&self, mut namespace: Namespace) -> Result<Namespace, ApiError> {
        let name = object_name(namespace.metadata.name.as_ref())?;
        let mut namespaces = self.namespaces.lock();
        if namespaces.contains_key(&name) {
            return Err(ApiError::already_exists(NAMESPACES, &name));
        }

        namespace.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        namespaces.insert(
            name,
            NamespaceState {
                namespace: namespace.clone(),
                ..Default::default()
            },
        );
        Ok(namespace)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ApiError> {
        self.namespaces
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(NAMESPACES, name))
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        mut deployment: Deployment,
    ) -> Result<Deployment, ApiError> {
        let name = object_name(deployment.metadata.name.as_ref())?;
        let ready = self.ready_workloads;
        self.with_namespace(namespace, |state| {
            if state.deployments.contains_key(&name) {
                return Err(ApiError::already_exists(DEPLOYMENTS, &name));
            }
            deployment.metadata.namespace = Some(namespace.to_string());
            if ready {
                deployment.status = Some(ready_deployment_status(&deployment));
            }
            state.deployments.insert(name, deployment.clone());
            Ok(deployment)
        })
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, ApiError> {
        self.with_namespace(namespace, |state| {
            state
                .deployments
                .get(name)
                .cloned()
                .ok_or_else(|| ApiError::not_found(DEPLOYMENTS, name))
        })
    }

    async fn create_service(
        &self,
        namespace: &str,
        mut service: Service,
    ) -> Result<Service, ApiError> {
        let name = object_name(service.metadata.name.as_ref())?;
        self.with_namespace(namespace, |state| {
            if state.services.contains_key(&name) {
                return Err(ApiError::already_exists(SERVICES, &name));
            }
            service.metadata.namespace = Some(namespace.to_string());
            state.services.insert(name, service.clone());
            Ok(service)
        })
    }

    async fn list_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Service>, ApiError> {
        let selector = parse_label_selector(label_selector)?;
        self.with_namespace(namespace, |state| {
            Ok(state
                .services
                .values()
                .filter(|svc| matches_selector(svc.metadata.labels.as_ref(), &selector))
                .cloned()
                .collect())
        })
    }

    async fn create_job(&self, namespace: &str, mut job: Job) -> Result<Job, ApiError> {
        let name = object_name(job.metadata.name.as_ref())?;
        let ready = self.ready_workloads;
        self.with_namespace(namespace, |state| {
            if state.jobs.contains_key(&name) {
                return Err(ApiError::already_exists(JOBS, &name));
            }
            job.metadata.namespace = Some(namespace.to_string());
            if ready {
                job.status = Some(complete_job_status());
            }
            state.jobs.insert(name, job.clone());
            Ok(job)
        })
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ApiError> {
        self.with_namespace(namespace, |state| {
            state
                .jobs
                .get(name)
                .cloned()
                .ok_or_else(|| ApiError::not_found(JOBS, name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn service(name: &str, routable: bool) -> Service {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), name.to_string());
        if routable {
            labels.insert("mystack/routable".to_string(), "true".to_string());
        }
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deployment(name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Story: the namespace name is unique and the second create loses
    #[tokio::test]
    async fn story_second_namespace_create_conflicts() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();

        let err = platform
            .create_namespace(namespace("mystack-a"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(platform.namespace_names(), vec!["mystack-a"]);
    }

    /// Story: objects cannot be created in a namespace that does not exist
    #[tokio::test]
    async fn story_create_into_missing_namespace_is_not_found() {
        let platform = InMemoryPlatform::new();
        let err = platform
            .create_service("mystack-ghost", service("web", true))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::not_found("namespaces", "mystack-ghost"));
    }

    /// Story: deleting a namespace removes everything inside it, and only it
    #[tokio::test]
    async fn story_namespace_delete_cascades() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();
        platform.create_namespace(namespace("mystack-b")).await.unwrap();
        platform.create_service("mystack-a", service("web", true)).await.unwrap();
        platform.create_service("mystack-b", service("web", true)).await.unwrap();

        platform.delete_namespace("mystack-a").await.unwrap();

        assert!(!platform.has_namespace("mystack-a"));
        assert!(platform.services("mystack-a").is_empty());
        assert_eq!(platform.services("mystack-b").len(), 1);
        assert!(platform.delete_namespace("mystack-a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_services_filters_by_selector() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();
        platform.create_service("mystack-a", service("web", true)).await.unwrap();
        platform.create_service("mystack-a", service("internal", false)).await.unwrap();

        let routable = platform
            .list_services("mystack-a", "mystack/routable=true")
            .await
            .unwrap();
        assert_eq!(routable.len(), 1);
        assert_eq!(routable[0].metadata.name.as_deref(), Some("web"));

        let all = platform.list_services("mystack-a", "").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_service_conflicts() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();
        platform.create_service("mystack-a", service("web", true)).await.unwrap();

        let err = platform
            .create_service("mystack-a", service("web", true))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "services \"web\" already exists");
    }

    #[tokio::test]
    async fn test_workloads_ready_by_default() {
        let platform = InMemoryPlatform::new();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();
        platform.create_deployment("mystack-a", deployment("web")).await.unwrap();

        let stored = platform.get_deployment("mystack-a", "web").await.unwrap();
        let status = stored.status.unwrap();
        assert_eq!(status.ready_replicas, Some(1));
    }

    #[tokio::test]
    async fn test_pending_workloads_stay_unready_until_marked() {
        let platform = InMemoryPlatform::new().with_pending_workloads();
        platform.create_namespace(namespace("mystack-a")).await.unwrap();
        platform.create_deployment("mystack-a", deployment("web")).await.unwrap();

        let stored = platform.get_deployment("mystack-a", "web").await.unwrap();
        assert!(stored.status.is_none());

        assert!(platform.mark_deployment_ready("mystack-a", "web"));
        let stored = platform.get_deployment("mystack-a", "web").await.unwrap();
        assert_eq!(stored.status.unwrap().ready_replicas, Some(1));
    }

    #[tokio::test]
    async fn test_unnamed_object_is_rejected() {
        let platform = InMemoryPlatform::new();
        let err = platform.create_namespace(Namespace::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Api(_)));
    }
}
