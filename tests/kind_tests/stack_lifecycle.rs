//! Stories about starting and stopping stacks on a real cluster

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};

use mystack::platform::PlatformClient;
use mystack::{username_to_namespace, Error};

use super::helpers::{cleanup, live_client, live_orchestrator, test_username};

/// Story: a user starts a stack, sees its hostnames, and stops it again
#[tokio::test]
#[ignore = "requires a Kubernetes cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_runs_and_stops_stack() {
    let (orchestrator, platform) = live_orchestrator().await;
    let username = test_username("lifecycle");
    let namespace = username_to_namespace(&username);

    orchestrator.create(&username, "Small").await.unwrap();

    let apps = orchestrator.apps(&username).await.unwrap();
    assert_eq!(
        apps,
        vec![format!("cache.{namespace}"), format!("web.{namespace}")]
    );

    let deployment = platform.get_deployment(&namespace, "cache").await.unwrap();
    let ready = deployment.status.and_then(|s| s.ready_replicas).unwrap_or(0);
    assert_eq!(ready, 1);

    orchestrator.delete(&username).await.unwrap();
    let err = orchestrator.apps(&username).await.unwrap_err();
    assert!(matches!(err, Error::NamespaceNotFound { .. }));
}

/// Story: starting twice is refused with the exact conflict message
#[tokio::test]
#[ignore = "requires a Kubernetes cluster - run with: cargo test --test kind -- --ignored"]
async fn story_second_run_conflicts() {
    let (orchestrator, _platform) = live_orchestrator().await;
    let username = test_username("conflict");

    orchestrator.create(&username, "Small").await.unwrap();
    let err = orchestrator.create(&username, "Small").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("namespace for user '{username}' already exists")
    );

    cleanup(&orchestrator, &username).await;
}

/// Story: the setup job completes before create returns
#[tokio::test]
#[ignore = "requires a Kubernetes cluster - run with: cargo test --test kind -- --ignored"]
async fn story_setup_job_completes() {
    let (orchestrator, platform) = live_orchestrator().await;
    let username = test_username("setup");
    let namespace = username_to_namespace(&username);

    orchestrator.create(&username, "Setup").await.unwrap();

    let job = platform.get_job(&namespace, "setup").await.unwrap();
    assert!(mystack::readiness::is_job_complete(&job));

    cleanup(&orchestrator, &username).await;
}

/// Story: every created object carries the ownership labels
#[tokio::test]
#[ignore = "requires a Kubernetes cluster - run with: cargo test --test kind -- --ignored"]
async fn story_objects_are_labelled_with_owner() {
    let (orchestrator, _platform) = live_orchestrator().await;
    let username = test_username("labels");
    let namespace = username_to_namespace(&username);

    orchestrator.create(&username, "Small").await.unwrap();

    let client = live_client().await;
    let owner = format!("mystack/owner={username}");
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(client, &namespace);

    let params = ListParams::default().labels(&owner);
    assert_eq!(deployments.list(&params).await.unwrap().items.len(), 2);
    assert_eq!(services.list(&params).await.unwrap().items.len(), 2);

    cleanup(&orchestrator, &username).await;
}

/// Story: stopping a stack that is not running is reported as not found
#[tokio::test]
#[ignore = "requires a Kubernetes cluster - run with: cargo test --test kind -- --ignored"]
async fn story_delete_without_stack() {
    let (orchestrator, _platform) = live_orchestrator().await;
    let username = test_username("missing");

    let err = orchestrator.delete(&username).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("namespace for user '{username}' not found")
    );
}
