//! Stack orchestration
//!
//! A [`Cluster`] is built fresh for every request from a user's resolved
//! stack specification. It holds no state of its own: the user's namespace
//! existing on the platform is the only marker that a stack is running.
//!
//! Create runs in a fixed order: namespace, every Deployment, every Service,
//! the setup Job and its completion wait, then the probe waits of services.
//! The first failure aborts the rest of the call.

use std::sync::Arc;

use futures::future::try_join_all;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info, instrument, warn};

use crate::config::{OrchestratorConfig, PartialFailurePolicy, Timing};
use crate::platform::{ApiError, PlatformClient};
use crate::readiness::{poll_until, CheckOutcome, ReadinessChecker, ReadinessTarget};
use crate::spec::{self, ClusterSpec, WorkloadSpec};
use crate::store::SpecStore;
use crate::workload::{hostname, Deployment, Job, Service, SETUP_JOB_NAME};
use crate::{Error, HERITAGE, LABEL_HERITAGE, LABEL_OWNER, LABEL_ROUTABLE};

/// Prefix of every stack namespace
pub const NAMESPACE_PREFIX: &str = "mystack-";

/// Namespace that holds `username`'s stack
pub fn username_to_namespace(username: &str) -> String {
    format!("{NAMESPACE_PREFIX}{username}")
}

/// A user's stack, ready to be created, deleted or queried
pub struct Cluster {
    /// Owning user
    pub username: String,
    /// Namespace derived from the username
    pub namespace: String,
    /// Deployments for declared apps, in name order
    pub app_deployments: Vec<Deployment>,
    /// Deployments for declared services, in name order
    pub svc_deployments: Vec<Deployment>,
    /// Services for declared apps, parallel to `app_deployments`
    pub app_services: Vec<Service>,
    /// Services for declared services, parallel to `svc_deployments`
    pub svc_services: Vec<Service>,
    /// Setup job, when the stack declares one
    pub job: Option<Job>,
    deployment_readiness: Arc<dyn ReadinessChecker>,
    job_readiness: Arc<dyn ReadinessChecker>,
    partial_failure: PartialFailurePolicy,
    deletion_wait: Option<Timing>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("app_deployments", &self.app_deployments)
            .field("svc_deployments", &self.svc_deployments)
            .field("app_services", &self.app_services)
            .field("svc_services", &self.svc_services)
            .field("job", &self.job)
            .field("partial_failure", &self.partial_failure)
            .field("deletion_wait", &self.deletion_wait)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Build the resource graph for `username` from a parsed specification
    pub fn new(
        username: impl Into<String>,
        spec: &ClusterSpec,
        deployment_readiness: Arc<dyn ReadinessChecker>,
        job_readiness: Arc<dyn ReadinessChecker>,
    ) -> Self {
        let username = username.into();

        let (svc_deployments, svc_services) = build_workloads(&username, spec.services.iter());
        let (app_deployments, app_services) = build_workloads(&username, spec.apps.iter());

        let stack_env = spec
            .services
            .values()
            .chain(spec.apps.values())
            .flat_map(|w| w.env.iter().cloned());
        let job = spec
            .setup
            .as_ref()
            .map(|setup| Job::new(username.clone(), setup, stack_env));

        Self {
            namespace: username_to_namespace(&username),
            username,
            app_deployments,
            svc_deployments,
            app_services,
            svc_services,
            job,
            deployment_readiness,
            job_readiness,
            partial_failure: PartialFailurePolicy::default(),
            deletion_wait: None,
        }
    }

    /// Apply the orchestration policies from `config`
    pub fn with_config(mut self, config: &OrchestratorConfig) -> Self {
        self.partial_failure = config.partial_failure;
        self.deletion_wait = config.deletion_wait;
        self
    }

    /// Look up `stack_name`, parse it, and build the cluster for `username`
    ///
    /// Storage and parse errors surface unchanged.
    pub async fn load(
        store: &dyn SpecStore,
        username: &str,
        stack_name: &str,
        config: &OrchestratorConfig,
        deployment_readiness: Arc<dyn ReadinessChecker>,
        job_readiness: Arc<dyn ReadinessChecker>,
    ) -> Result<Self, Error> {
        let text = store.lookup_by_name(stack_name).await?;
        let spec = spec::parse_with_defaults(&text, config.default_timing)?;
        debug!(
            stack = %stack_name,
            services = spec.services.len(),
            apps = spec.apps.len(),
            setup = spec.setup.is_some(),
            "stack specification loaded"
        );
        Ok(Self::new(username, &spec, deployment_readiness, job_readiness).with_config(config))
    }

    /// Every Deployment, services first
    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.svc_deployments.iter().chain(self.app_deployments.iter())
    }

    /// Every Service, services first
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.svc_services.iter().chain(self.app_services.iter())
    }

    /// Create the namespace and everything declared in it, then wait for readiness
    #[instrument(skip_all, fields(user = %self.username, namespace = %self.namespace))]
    pub async fn create(&self, platform: &dyn PlatformClient) -> Result<(), Error> {
        // Advisory only; the create below is the real exclusivity point
        match platform.get_namespace(&self.namespace).await {
            Ok(_) => return Err(Error::namespace_conflict(&self.username)),
            Err(ApiError::NotFound(_)) => {}
            Err(e) => return Err(Error::platform("get namespace error", e)),
        }

        platform
            .create_namespace(self.render_namespace())
            .await
            .map_err(|e| match e {
                ApiError::AlreadyExists(_) => Error::namespace_conflict(&self.username),
                other => Error::platform("create namespace error", other),
            })?;
        info!(user = %self.username, namespace = %self.namespace, "namespace created");

        if let Err(err) = self.populate(platform).await {
            warn!(user = %self.username, error = %err, "stack creation failed");
            self.handle_partial_failure(platform).await;
            return Err(err);
        }

        info!(user = %self.username, namespace = %self.namespace, "stack ready");
        Ok(())
    }

    async fn populate(&self, platform: &dyn PlatformClient) -> Result<(), Error> {
        try_join_all(self.deployments().map(|d| d.submit(platform))).await?;
        try_join_all(self.services().map(|s| s.submit(platform))).await?;
        debug!(
            namespace = %self.namespace,
            deployments = self.svc_deployments.len() + self.app_deployments.len(),
            "workloads submitted"
        );

        if let Some(job) = &self.job {
            job.submit(platform).await?;
            let target = ReadinessTarget::new(&self.namespace, SETUP_JOB_NAME);
            self.job_readiness
                .wait_until_ready(platform, &target, job.timing)
                .await?;
        }

        for deployment in &self.svc_deployments {
            if let Some(probe) = &deployment.probe {
                let target = ReadinessTarget::new(&self.namespace, &deployment.name);
                self.deployment_readiness
                    .wait_until_ready(platform, &target, probe.timing)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_partial_failure(&self, platform: &dyn PlatformClient) {
        match self.partial_failure {
            PartialFailurePolicy::LeavePartial => {
                info!(namespace = %self.namespace, "leaving partially created stack in place");
            }
            PartialFailurePolicy::DeleteNamespace => {
                match platform.delete_namespace(&self.namespace).await {
                    Ok(()) => info!(namespace = %self.namespace, "rolled back namespace"),
                    Err(e) => {
                        warn!(namespace = %self.namespace, error = %e, "failed to roll back namespace")
                    }
                }
            }
        }
    }

    /// Delete the namespace; the platform removes everything inside it
    #[instrument(skip_all, fields(user = %self.username, namespace = %self.namespace))]
    pub async fn delete(&self, platform: &dyn PlatformClient) -> Result<(), Error> {
        self.ensure_namespace(platform).await?;

        platform
            .delete_namespace(&self.namespace)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => Error::namespace_not_found(&self.username),
                other => Error::platform("delete namespace error", other),
            })?;
        info!(user = %self.username, namespace = %self.namespace, "namespace deletion accepted");

        if let Some(timing) = self.deletion_wait {
            let namespace = self.namespace.as_str();
            poll_until(format!("namespace {namespace} deletion"), timing, || async move {
                match platform.get_namespace(namespace).await {
                    Err(ApiError::NotFound(_)) => Ok(CheckOutcome::Ready),
                    Ok(_) => Ok(CheckOutcome::Pending),
                    Err(e) => Err(e),
                }
            })
            .await?;
            debug!(namespace = %self.namespace, "namespace gone");
        }
        Ok(())
    }

    /// Hostnames (`<service>.<namespace>`) of every routable service, sorted
    #[instrument(skip_all, fields(user = %self.username, namespace = %self.namespace))]
    pub async fn apps(&self, platform: &dyn PlatformClient) -> Result<Vec<String>, Error> {
        self.ensure_namespace(platform).await?;

        let selector = format!("{LABEL_ROUTABLE}=true");
        let services = platform
            .list_services(&self.namespace, &selector)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => Error::namespace_not_found(&self.username),
                other => Error::platform("list services error", other),
            })?;

        let mut hostnames: Vec<String> = services
            .iter()
            .filter_map(|svc| svc.metadata.name.as_deref())
            .map(|name| hostname(name, &self.namespace))
            .collect();
        hostnames.sort();
        Ok(hostnames)
    }

    async fn ensure_namespace(&self, platform: &dyn PlatformClient) -> Result<(), Error> {
        match platform.get_namespace(&self.namespace).await {
            Ok(_) => Ok(()),
            Err(ApiError::NotFound(_)) => Err(Error::namespace_not_found(&self.username)),
            Err(e) => Err(Error::platform("get namespace error", e)),
        }
    }

    fn render_namespace(&self) -> Namespace {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert(LABEL_HERITAGE.to_string(), HERITAGE.to_string());
        labels.insert(LABEL_OWNER.to_string(), self.username.clone());
        Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn build_workloads<'a>(
    username: &str,
    entries: impl Iterator<Item = (&'a String, &'a WorkloadSpec)>,
) -> (Vec<Deployment>, Vec<Service>) {
    entries
        .map(|(name, spec)| {
            (
                Deployment::new(name.clone(), username, spec),
                Service::new(name.clone(), username, spec.ports.clone()),
            )
        })
        .unzip()
}
