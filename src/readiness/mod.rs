//! Readiness checking
//!
//! A [`ReadinessChecker`] blocks until a workload reaches its target state or
//! the deadline passes. Checkers are chosen when a cluster is built, not when
//! it waits: [`DeploymentReadiness`] for rollouts, [`JobReadiness`] for the
//! setup job and [`NoopReadiness`] for platform-free tests.
//!
//! All waiting goes through [`poll_until`], which always performs at least
//! one check, bounds every check individually, and never runs past
//! `start + timeout` by more than one check.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use crate::config::Timing;
use crate::platform::{ApiError, PlatformClient};
use crate::Error;

/// Smallest time budget given to a single check
///
/// Lets a zero timeout still perform one real platform call.
pub const MIN_CHECK_BUDGET: Duration = Duration::from_secs(5);

/// Smallest pause between two checks
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one readiness check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Target condition holds
    Ready,
    /// Not yet; keep polling
    Pending,
    /// Target reached a terminal failure; stop polling
    Failed(String),
}

/// Object a checker waits on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessTarget {
    /// Namespace of the object
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ReadinessTarget {
    /// Create a target
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Capability that waits until a target is operational
#[async_trait]
pub trait ReadinessChecker: Send + Sync {
    /// Poll every `timing.period_seconds` until ready, failing once
    /// `timing.timeout_seconds` has elapsed
    async fn wait_until_ready(
        &self,
        platform: &dyn PlatformClient,
        target: &ReadinessTarget,
        timing: Timing,
    ) -> Result<(), Error>;
}

/// Poll `check_fn` until it reports ready, fails terminally, or time runs out
///
/// Transient errors from `check_fn` are retried until the deadline and the
/// last one is reported in the resulting [`Error::Timeout`].
pub async fn poll_until<F, Fut>(
    target: impl Into<String>,
    timing: Timing,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<CheckOutcome, ApiError>>,
{
    let target = target.into();
    let deadline = Instant::now() + timing.timeout();
    let mut last_error = None;

    loop {
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .max(MIN_CHECK_BUDGET);

        match tokio::time::timeout(budget, check_fn()).await {
            Ok(Ok(CheckOutcome::Ready)) => return Ok(()),
            Ok(Ok(CheckOutcome::Pending)) => {
                trace!(resource = %target, "not ready yet");
            }
            Ok(Ok(CheckOutcome::Failed(message))) => {
                return Err(Error::ReadinessFailed { target, message });
            }
            Ok(Err(e)) => {
                trace!(resource = %target, error = %e, "readiness check failed, retrying");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                last_error = Some(format!(
                    "check did not complete within {}s",
                    budget.as_secs()
                ));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                target,
                timeout_seconds: timing.timeout_seconds,
                last_error,
            });
        }

        let pause = timing.period().max(MIN_POLL_INTERVAL).min(deadline - now);
        tokio::time::sleep(pause).await;
    }
}

// =============================================================================
// Deployment rollout
// =============================================================================

/// Waits until every desired replica of a Deployment is ready
///
/// The container's readiness probe gates `readyReplicas`, so this is the
/// platform-side equivalent of "the probe command succeeds".
#[derive(Clone, Copy, Debug, Default)]
pub struct DeploymentReadiness;

/// Classify a Deployment's rollout state
pub fn deployment_outcome(deployment: &Deployment) -> CheckOutcome {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();

    let stalled = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions.iter().find(|c| {
                c.type_ == "Progressing"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
            })
        });
    if let Some(condition) = stalled {
        return CheckOutcome::Failed(
            condition
                .message
                .clone()
                .unwrap_or_else(|| "progress deadline exceeded".to_string()),
        );
    }

    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    if ready >= desired {
        CheckOutcome::Ready
    } else {
        CheckOutcome::Pending
    }
}

#[async_trait]
impl ReadinessChecker for DeploymentReadiness {
    #[instrument(skip_all, fields(resource = %target, timeout = timing.timeout_seconds))]
    async fn wait_until_ready(
        &self,
        platform: &dyn PlatformClient,
        target: &ReadinessTarget,
        timing: Timing,
    ) -> Result<(), Error> {
        poll_until(format!("deployment {target}"), timing, || async move {
            let deployment = platform
                .get_deployment(&target.namespace, &target.name)
                .await?;
            Ok::<_, ApiError>(deployment_outcome(&deployment))
        })
        .await?;
        debug!(resource = %target, "deployment ready");
        Ok(())
    }
}

// =============================================================================
// Job completion
// =============================================================================

/// Waits until a Job has completed
#[derive(Clone, Copy, Debug, Default)]
pub struct JobReadiness;

/// Check if a Job has completed successfully
pub fn is_job_complete(job: &Job) -> bool {
    let status = job.status.as_ref();
    let complete = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Complete" && c.status == "True")
        })
        .unwrap_or(false);
    complete || status.and_then(|s| s.succeeded).unwrap_or(0) >= 1
}

/// Extract the failure message from a failed Job, if it failed
pub fn job_failure_message(job: &Job) -> Option<String> {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.type_ == "Failed" && c.status == "True")
                .map(|c| {
                    c.message
                        .clone()
                        .or_else(|| c.reason.clone())
                        .unwrap_or_else(|| "job failed".to_string())
                })
        })
}

/// Classify a Job's completion state
pub fn job_outcome(job: &Job) -> CheckOutcome {
    if let Some(message) = job_failure_message(job) {
        CheckOutcome::Failed(message)
    } else if is_job_complete(job) {
        CheckOutcome::Ready
    } else {
        CheckOutcome::Pending
    }
}

#[async_trait]
impl ReadinessChecker for JobReadiness {
    #[instrument(skip_all, fields(resource = %target, timeout = timing.timeout_seconds))]
    async fn wait_until_ready(
        &self,
        platform: &dyn PlatformClient,
        target: &ReadinessTarget,
        timing: Timing,
    ) -> Result<(), Error> {
        poll_until(format!("job {target}"), timing, || async move {
            let job = platform.get_job(&target.namespace, &target.name).await?;
            Ok::<_, ApiError>(job_outcome(&job))
        })
        .await?;
        debug!(resource = %target, "job complete");
        Ok(())
    }
}

// =============================================================================
// No-op
// =============================================================================

/// Succeeds immediately without touching the platform
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReadiness;

#[async_trait]
impl ReadinessChecker for NoopReadiness {
    async fn wait_until_ready(
        &self,
        _platform: &dyn PlatformClient,
        _target: &ReadinessTarget,
        _timing: Timing,
    ) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    use crate::platform::MockPlatformClient;

    fn deployment(replicas: Option<i32>, ready: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas,
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn job_with(condition: &str, message: Option<&str>) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: condition.to_string(),
                    status: "True".to_string(),
                    message: message.map(str::to_string),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_outcome() {
        assert_eq!(deployment_outcome(&deployment(None, Some(1))), CheckOutcome::Ready);
        assert_eq!(deployment_outcome(&deployment(Some(2), Some(1))), CheckOutcome::Pending);
        assert_eq!(deployment_outcome(&deployment(Some(1), None)), CheckOutcome::Pending);
        assert_eq!(deployment_outcome(&Deployment::default()), CheckOutcome::Pending);
    }

    #[test]
    fn test_stalled_rollout_is_terminal() {
        let mut stalled = deployment(Some(1), None);
        stalled.status.as_mut().unwrap().conditions = Some(vec![DeploymentCondition {
            type_: "Progressing".to_string(),
            status: "False".to_string(),
            reason: Some("ProgressDeadlineExceeded".to_string()),
            message: Some("ReplicaSet \"web-1\" has timed out progressing.".to_string()),
            ..Default::default()
        }]);
        assert!(matches!(deployment_outcome(&stalled), CheckOutcome::Failed(_)));
    }

    #[test]
    fn test_job_outcome() {
        assert_eq!(job_outcome(&job_with("Complete", None)), CheckOutcome::Ready);
        assert_eq!(
            job_outcome(&job_with("Failed", Some("BackoffLimitExceeded"))),
            CheckOutcome::Failed("BackoffLimitExceeded".to_string())
        );
        assert_eq!(job_outcome(&Job::default()), CheckOutcome::Pending);

        let succeeded = Job {
            status: Some(JobStatus {
                succeeded: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(job_outcome(&succeeded), CheckOutcome::Ready);
    }

    /// Story: a zero timeout still performs exactly one check
    #[tokio::test(start_paused = true)]
    async fn story_zero_timeout_checks_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_until("deployment mystack-user/test0", Timing::DEFAULT, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(CheckOutcome::Pending) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Timeout { timeout_seconds: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn story_zero_timeout_ready_on_first_check_succeeds() {
        poll_until("job mystack-user/setup", Timing::DEFAULT, || async {
            Ok(CheckOutcome::Ready)
        })
        .await
        .unwrap();
    }

    /// Story: polling continues at the configured period until the target is ready
    #[tokio::test(start_paused = true)]
    async fn story_polls_until_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        poll_until("deployment mystack-user/test0", Timing::new(10, 180), || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n >= 2 {
                    Ok(CheckOutcome::Ready)
                } else {
                    Ok(CheckOutcome::Pending)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    /// Story: the deadline bounds the wait and the last transient error is kept
    #[tokio::test(start_paused = true)]
    async fn story_timeout_reports_last_error() {
        let start = Instant::now();

        let err = poll_until("job mystack-user/setup", Timing::new(10, 25), || async {
            Err(ApiError::Api("connection refused".to_string()))
        })
        .await
        .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(25));
        match err {
            Error::Timeout {
                target,
                timeout_seconds,
                last_error,
            } => {
                assert_eq!(target, "job mystack-user/setup");
                assert_eq!(timeout_seconds, 25);
                assert_eq!(last_error.as_deref(), Some("connection refused"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    /// Story: a check that never returns cannot hang the wait
    #[tokio::test(start_paused = true)]
    async fn story_stuck_check_is_bounded() {
        let err = poll_until("deployment mystack-user/test0", Timing::new(1, 3), || {
            std::future::pending::<Result<CheckOutcome, ApiError>>()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout { last_error: Some(_), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn story_terminal_failure_stops_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_until("job mystack-user/setup", Timing::new(1, 60), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(CheckOutcome::Failed("BackoffLimitExceeded".to_string())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "job mystack-user/setup failed: BackoffLimitExceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_readiness_reads_job_status() {
        let mut platform = MockPlatformClient::new();
        platform
            .expect_get_job()
            .withf(|ns, name| ns == "mystack-user" && name == "setup")
            .times(1)
            .returning(|_, _| Ok(job_with("Complete", None)));

        JobReadiness
            .wait_until_ready(
                &platform,
                &ReadinessTarget::new("mystack-user", "setup"),
                Timing::new(10, 180),
            )
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deployment_readiness_waits_for_replicas() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut platform = MockPlatformClient::new();
        platform.expect_get_deployment().returning(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(deployment(Some(1), (n > 0).then_some(1)))
        });

        DeploymentReadiness
            .wait_until_ready(
                &platform,
                &ReadinessTarget::new("mystack-user", "test0"),
                Timing::new(5, 60),
            )
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_noop_never_touches_platform() {
        let platform = MockPlatformClient::new();
        NoopReadiness
            .wait_until_ready(
                &platform,
                &ReadinessTarget::new("mystack-user", "test0"),
                Timing::DEFAULT,
            )
            .await
            .unwrap();
    }
}
