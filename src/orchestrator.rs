//! Per-user stack operations
//!
//! [`Orchestrator`] is what an API layer calls: it resolves a username and
//! stack name into a [`Cluster`] using its injected collaborators and runs
//! one operation against the platform.

use std::sync::Arc;

use tracing::instrument;

use crate::cluster::Cluster;
use crate::config::OrchestratorConfig;
use crate::platform::PlatformClient;
use crate::readiness::{DeploymentReadiness, JobReadiness, ReadinessChecker};
use crate::spec::ClusterSpec;
use crate::store::SpecStore;
use crate::Error;

/// Entry point for creating, deleting and querying user stacks
#[derive(Clone)]
pub struct Orchestrator {
    /// Platform the stacks live on
    pub platform: Arc<dyn PlatformClient>,
    /// Source of stack specifications
    pub store: Arc<dyn SpecStore>,
    /// Waits for Deployments with readiness probes
    pub deployment_readiness: Arc<dyn ReadinessChecker>,
    /// Waits for the setup Job
    pub job_readiness: Arc<dyn ReadinessChecker>,
    /// Shared orchestration settings
    pub config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a builder with the two required collaborators
    pub fn builder(
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn SpecStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(platform, store)
    }

    /// Start `stack_name` for `username` and wait until it is ready
    #[instrument(skip(self))]
    pub async fn create(&self, username: &str, stack_name: &str) -> Result<(), Error> {
        let cluster = Cluster::load(
            self.store.as_ref(),
            username,
            stack_name,
            &self.config,
            self.deployment_readiness.clone(),
            self.job_readiness.clone(),
        )
        .await?;
        cluster.create(self.platform.as_ref()).await
    }

    /// Tear down `username`'s stack
    #[instrument(skip(self))]
    pub async fn delete(&self, username: &str) -> Result<(), Error> {
        self.bare_cluster(username)
            .delete(self.platform.as_ref())
            .await
    }

    /// Hostnames of `username`'s routable services
    #[instrument(skip(self))]
    pub async fn apps(&self, username: &str) -> Result<Vec<String>, Error> {
        self.bare_cluster(username).apps(self.platform.as_ref()).await
    }

    /// Delete and Apps only need the namespace, not the specification
    fn bare_cluster(&self, username: &str) -> Cluster {
        Cluster::new(
            username,
            &ClusterSpec::default(),
            self.deployment_readiness.clone(),
            self.job_readiness.clone(),
        )
        .with_config(&self.config)
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn SpecStore>,
    deployment_readiness: Option<Arc<dyn ReadinessChecker>>,
    job_readiness: Option<Arc<dyn ReadinessChecker>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    fn new(platform: Arc<dyn PlatformClient>, store: Arc<dyn SpecStore>) -> Self {
        Self {
            platform,
            store,
            deployment_readiness: None,
            job_readiness: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Override the Deployment readiness checker
    pub fn deployment_readiness(mut self, checker: Arc<dyn ReadinessChecker>) -> Self {
        self.deployment_readiness = Some(checker);
        self
    }

    /// Override the Job readiness checker
    pub fn job_readiness(mut self, checker: Arc<dyn ReadinessChecker>) -> Self {
        self.job_readiness = Some(checker);
        self
    }

    /// Use `checker` for both Deployments and Jobs
    pub fn readiness(self, checker: Arc<dyn ReadinessChecker>) -> Self {
        self.deployment_readiness(checker.clone()).job_readiness(checker)
    }

    /// Set the orchestration settings
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator, defaulting to the platform-backed checkers
    pub fn build(self) -> Orchestrator {
        Orchestrator {
            platform: self.platform,
            store: self.store,
            deployment_readiness: self
                .deployment_readiness
                .unwrap_or_else(|| Arc::new(DeploymentReadiness)),
            job_readiness: self.job_readiness.unwrap_or_else(|| Arc::new(JobReadiness)),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use crate::readiness::NoopReadiness;
    use crate::store::StaticSpecStore;

    const STACK: &str = r#"
services:
  postgres:
    image: postgres:1.0
    ports: ["5432"]
apps:
  web:
    image: web:1.0
    ports: ["80:8080"]
"#;

    fn orchestrator(platform: Arc<InMemoryPlatform>) -> Orchestrator {
        let store = StaticSpecStore::new().with_spec("MyCustomApps", STACK);
        Orchestrator::builder(platform, Arc::new(store))
            .readiness(Arc::new(NoopReadiness))
            .build()
    }

    /// Story: a user starts a stack, lists its apps, then stops it
    #[tokio::test]
    async fn story_full_lifecycle_by_username() {
        let platform = Arc::new(InMemoryPlatform::new());
        let orchestrator = orchestrator(platform.clone());

        orchestrator.create("user", "MyCustomApps").await.unwrap();
        assert_eq!(
            orchestrator.apps("user").await.unwrap(),
            vec!["postgres.mystack-user", "web.mystack-user"]
        );

        orchestrator.delete("user").await.unwrap();
        assert!(!platform.has_namespace("mystack-user"));
        assert!(orchestrator.apps("user").await.is_err());
    }

    #[tokio::test]
    async fn story_unknown_stack_creates_nothing() {
        let platform = Arc::new(InMemoryPlatform::new());
        let orchestrator = orchestrator(platform.clone());

        let err = orchestrator.create("user", "Missing").await.unwrap_err();
        assert_eq!(err.to_string(), "no rows in result set");
        assert!(platform.namespace_names().is_empty());
    }

    #[tokio::test]
    async fn test_builder_defaults_to_platform_checkers() {
        let platform = Arc::new(InMemoryPlatform::new());
        let orchestrator =
            Orchestrator::builder(platform.clone(), Arc::new(StaticSpecStore::new())).build();

        assert!(orchestrator.config.deletion_wait.is_none());
        assert!(orchestrator.delete("nobody").await.is_err());
    }
}
