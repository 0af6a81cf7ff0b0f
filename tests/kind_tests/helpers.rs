//! Shared fixtures for live-cluster tests

use std::path::PathBuf;
use std::sync::Arc;

use kube::Client;
use mystack::config::{OrchestratorConfig, Timing};
use mystack::platform::{create_client, KubePlatform};
use mystack::store::StaticSpecStore;
use mystack::Orchestrator;

/// Stack with one probed service and one app, using tiny public images
pub const SMALL_STACK: &str = r#"
services:
  cache:
    image: redis:7-alpine
    ports: ["6379"]
    readiness-probe:
      command: [redis-cli, ping]
      period-seconds: 2
      start-deployment-timeout-seconds: 120
apps:
  web:
    image: nginx:alpine
    ports: ["80"]
"#;

/// Stack whose setup job completes immediately
pub const SETUP_STACK: &str = r#"
setup:
  image: busybox:1.36
  period-seconds: 2
  timeout-seconds: 120
apps:
  web:
    image: nginx:alpine
    ports: ["80"]
    env:
      - name: GREETING
        value: hello
"#;

/// Unique username per test so parallel runs never share a namespace
pub fn test_username(story: &str) -> String {
    let suffix = std::process::id();
    format!("it-{story}-{suffix}")
}

/// Client for the cluster from `MYSTACK_KUBECONFIG` (or inferred)
pub async fn live_client() -> Client {
    let kubeconfig = std::env::var_os("MYSTACK_KUBECONFIG").map(PathBuf::from);
    create_client(kubeconfig.as_deref())
        .await
        .expect("cluster should be reachable")
}

/// Orchestrator wired to the live cluster
pub async fn live_orchestrator() -> (Orchestrator, Arc<KubePlatform>) {
    let platform = Arc::new(KubePlatform::new(live_client().await));

    let store = StaticSpecStore::new()
        .with_spec("Small", SMALL_STACK)
        .with_spec("Setup", SETUP_STACK);

    let orchestrator = Orchestrator::builder(platform.clone(), Arc::new(store))
        .config(OrchestratorConfig {
            deletion_wait: Some(Timing::new(2, 120)),
            ..Default::default()
        })
        .build();
    (orchestrator, platform)
}

/// Best-effort removal of a user's stack
pub async fn cleanup(orchestrator: &Orchestrator, username: &str) {
    let _ = orchestrator.delete(username).await;
}
