//! Orchestrator configuration
//!
//! Defaults here are the single source of truth for the parser, the
//! orchestrator and the CLI.

use std::time::Duration;

/// Polling period applied when a specification omits `period-seconds`
pub const DEFAULT_PERIOD_SECONDS: u32 = 0;

/// Deadline applied when a specification omits its timeout
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 0;

/// Field manager recorded on every resource we create
pub const DEFAULT_FIELD_MANAGER: &str = "mystack";

/// Readiness polling cadence and deadline, in whole seconds
///
/// Zero is a legal value for both: it means "check once, immediately".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timing {
    /// Interval between checks
    pub period_seconds: u32,
    /// Deadline measured from the start of the wait
    pub timeout_seconds: u32,
}

impl Timing {
    /// Timing applied when a specification leaves both fields out
    pub const DEFAULT: Timing = Timing {
        period_seconds: DEFAULT_PERIOD_SECONDS,
        timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
    };

    /// Create a timing
    pub fn new(period_seconds: u32, timeout_seconds: u32) -> Self {
        Self {
            period_seconds,
            timeout_seconds,
        }
    }

    /// Polling interval as a Duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_seconds))
    }

    /// Deadline as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

/// What Create does with resources it already submitted when a later step fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartialFailurePolicy {
    /// Leave the namespace and everything in it for inspection
    #[default]
    LeavePartial,
    /// Delete the namespace (best effort) before returning the original error
    DeleteNamespace,
}

/// Configuration shared by every orchestration call
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Timing used for omitted `period-seconds` / `timeout-seconds`
    pub default_timing: Timing,
    /// Behaviour on a failure after the namespace was created
    pub partial_failure: PartialFailurePolicy,
    /// When set, Delete waits until the namespace is gone
    pub deletion_wait: Option<Timing>,
    /// Field manager for created resources
    pub field_manager: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timing: Timing::DEFAULT,
            partial_failure: PartialFailurePolicy::default(),
            deletion_wait: None,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_check_once() {
        assert_eq!(Timing::DEFAULT, Timing::new(0, 0));
        assert_eq!(Timing::DEFAULT.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_default_config_leaves_partial_state() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.partial_failure, PartialFailurePolicy::LeavePartial);
        assert!(config.deletion_wait.is_none());
        assert_eq!(config.field_manager, "mystack");
    }

    #[test]
    fn test_timing_durations() {
        let timing = Timing::new(10, 180);
        assert_eq!(timing.period(), Duration::from_secs(10));
        assert_eq!(timing.timeout(), Duration::from_secs(180));
    }
}
