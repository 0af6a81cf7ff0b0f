//! Resource builders
//!
//! Each stack entry becomes a small domain object ([`Deployment`],
//! [`Service`], [`Job`]) that knows how to render itself into the platform's
//! resource type and submit it. Builders are independent of each other; the
//! ordering between kinds belongs to [`crate::cluster::Cluster`].
//!
//! Failures follow one taxonomy: a render failure is a spec error in the
//! "parse yaml error" class, a rejected submission is a platform error whose
//! context names the failed call (e.g. "create service error").

mod deployment;
mod job;
mod service;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar as K8sEnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::PARSE_YAML_ERROR;
use crate::spec::{validate_name, EnvVar};
use crate::{Error, HERITAGE, LABEL_APP, LABEL_HERITAGE, LABEL_OWNER};

pub use deployment::Deployment;
pub use job::{Job, SETUP_JOB_NAME};
pub use service::{hostname, Service};

/// Labels carried by every workload object: `app`, `heritage` and owner
pub fn workload_labels(name: &str, username: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name);
    labels.insert(LABEL_HERITAGE.to_string(), HERITAGE.to_string());
    labels.insert(LABEL_OWNER.to_string(), username.to_string());
    labels
}

/// Labels used to select a workload's pods
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), name.to_string());
    labels
}

/// Metadata for a namespaced object
fn object_meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Reject names the platform would refuse before anything is submitted
fn check_names(name: &str, namespace: &str) -> Result<(), Error> {
    validate_name(name)
        .and_then(|_| validate_name(namespace))
        .map_err(|e| Error::spec(PARSE_YAML_ERROR, e))
}

/// Render env vars; `None` when there are none so the field is omitted
fn render_env(env: &[EnvVar]) -> Option<Vec<K8sEnvVar>> {
    if env.is_empty() {
        return None;
    }
    Some(
        env.iter()
            .map(|var| K8sEnvVar {
                name: var.name.clone(),
                value: Some(var.value.clone()),
                ..Default::default()
            })
            .collect(),
    )
}
