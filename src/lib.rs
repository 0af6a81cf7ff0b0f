//! mystack - isolated per-user application stacks on Kubernetes
//!
//! A stack specification (YAML, looked up by name) declares services, apps and
//! an optional setup job. mystack materialises it into a dedicated namespace
//! per user, waits for it to become operational, and tears it down by
//! deleting that namespace.
//!
//! # Modules
//!
//! - [`spec`] - Stack specification parsing and validation
//! - [`workload`] - Deployment, Service and Job builders
//! - [`readiness`] - Bounded readiness polling
//! - [`cluster`] - Create / Delete / Apps orchestration for one user
//! - [`orchestrator`] - Username-level entry point with injected collaborators
//! - [`platform`] - Platform client trait, kube-rs and in-memory implementations
//! - [`store`] - Specification storage
//! - [`config`] - Orchestration settings and defaults
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod readiness;
pub mod spec;
pub mod store;
pub mod telemetry;
pub mod workload;

pub use cluster::{username_to_namespace, Cluster};
pub use error::{Error, ErrorKind};
pub use orchestrator::Orchestrator;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Labels
// =============================================================================

/// Label naming the workload a resource belongs to
pub const LABEL_APP: &str = "app";

/// Label marking resources created by mystack
pub const LABEL_HERITAGE: &str = "heritage";

/// Value of [`LABEL_HERITAGE`]
pub const HERITAGE: &str = "mystack";

/// Label naming the user who owns a resource
pub const LABEL_OWNER: &str = "mystack/owner";

/// Label selecting services returned by the apps query
pub const LABEL_ROUTABLE: &str = "mystack/routable";
