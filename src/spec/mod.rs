//! Stack specification parsing
//!
//! Turns stack-specification YAML into a validated [`ClusterSpec`]. Decoding
//! happens in two passes: serde fills a loosely-typed document (so numeric
//! and string scalars are both accepted), then [`parse_with_defaults`]
//! resolves port tokens, materialises env values as strings, applies timing
//! defaults and validates names. A parse either yields a complete spec or an
//! error, never both.

mod ports;

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::config::Timing;
use crate::Error;

pub use ports::PortMap;

/// Context used for validation failures
pub const INVALID_SPEC: &str = "invalid stack specification";

/// Maximum length of a DNS-1123 label
const MAX_NAME_LEN: usize = 63;

// =============================================================================
// Typed specification
// =============================================================================

/// A fully resolved stack specification
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSpec {
    /// Optional one-shot setup job
    pub setup: Option<SetupSpec>,
    /// Backing services, keyed by name; may carry readiness probes
    pub services: BTreeMap<String, WorkloadSpec>,
    /// Applications, keyed by name; never carry probes
    pub apps: BTreeMap<String, WorkloadSpec>,
}

/// A single long-running workload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadSpec {
    /// Container image
    pub image: String,
    /// Port mappings in authored order
    pub ports: Vec<PortMap>,
    /// Environment in authored order
    pub env: Vec<EnvVar>,
    /// Readiness probe (services only)
    pub readiness_probe: Option<ProbeSpec>,
}

impl WorkloadSpec {
    /// Container ports: the target side of every mapping
    pub fn container_ports(&self) -> Vec<u16> {
        self.ports.iter().map(|p| p.target_port).collect()
    }
}

/// Command-based readiness check
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbeSpec {
    /// Command executed inside the container
    pub command: Vec<String>,
    /// How often to poll and how long to wait for the deployment to start
    pub timing: Timing,
}

/// One-shot setup job
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetupSpec {
    /// Container image
    pub image: String,
    /// How often to poll and how long to wait for completion
    pub timing: Timing,
    /// Environment in authored order
    pub env: Vec<EnvVar>,
}

/// Environment variable; the value is always a string
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

impl EnvVar {
    /// Create an env var
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse specification text using the compiled-in timing defaults
pub fn parse(text: &str) -> Result<ClusterSpec, Error> {
    parse_with_defaults(text, Timing::DEFAULT)
}

/// Parse specification text, filling omitted timing fields from `defaults`
pub fn parse_with_defaults(text: &str, defaults: Timing) -> Result<ClusterSpec, Error> {
    if text.trim().is_empty() {
        return Ok(ClusterSpec::default());
    }

    let raw: RawClusterSpec = serde_yaml::from_str(text).map_err(Error::parse_yaml)?;

    let services = raw
        .services
        .into_iter()
        .map(|(name, workload)| {
            let spec = workload.resolve(&name, defaults, true)?;
            Ok((name, spec))
        })
        .collect::<Result<BTreeMap<_, _>, Error>>()?;

    let apps = raw
        .apps
        .into_iter()
        .map(|(name, workload)| {
            let spec = workload.resolve(&name, defaults, false)?;
            Ok((name, spec))
        })
        .collect::<Result<BTreeMap<_, _>, Error>>()?;

    if let Some(name) = services.keys().find(|name| apps.contains_key(*name)) {
        return Err(Error::spec(
            INVALID_SPEC,
            format!("'{name}' is declared as both a service and an app"),
        ));
    }

    let setup = raw.setup.map(|setup| setup.resolve(defaults)).transpose()?;

    Ok(ClusterSpec {
        setup,
        services,
        apps,
    })
}

/// Check that `name` is a DNS-1123 label (the platform's naming rule)
pub fn validate_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(Error::spec(
            INVALID_SPEC,
            format!("'{name}' is not a valid name: use lowercase letters, digits and '-'"),
        ))
    }
}

// =============================================================================
// Raw document
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawClusterSpec {
    #[serde(default)]
    setup: Option<RawSetup>,
    #[serde(default)]
    services: BTreeMap<String, RawWorkload>,
    #[serde(default)]
    apps: BTreeMap<String, RawWorkload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawWorkload {
    #[serde(default)]
    image: String,
    #[serde(default)]
    ports: Vec<Scalar>,
    #[serde(default)]
    env: Vec<RawEnvVar>,
    #[serde(default)]
    readiness_probe: Option<RawProbe>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawProbe {
    #[serde(default)]
    command: Vec<Scalar>,
    #[serde(default)]
    period_seconds: Option<u32>,
    #[serde(default)]
    start_deployment_timeout_seconds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSetup {
    #[serde(default)]
    image: String,
    #[serde(default)]
    period_seconds: Option<u32>,
    #[serde(default)]
    timeout_seconds: Option<u32>,
    #[serde(default)]
    env: Vec<RawEnvVar>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnvVar {
    name: String,
    #[serde(default)]
    value: Scalar,
}

/// A YAML scalar of any type, kept as its string form
#[derive(Debug, Default)]
struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde_yaml::Value;

        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Scalar(s)),
            Value::Number(n) => Ok(Scalar(n.to_string())),
            Value::Bool(b) => Ok(Scalar(b.to_string())),
            Value::Null => Ok(Scalar(String::new())),
            other => Err(D::Error::custom(format!(
                "expected a string or number, found {other:?}"
            ))),
        }
    }
}

impl RawWorkload {
    fn resolve(self, name: &str, defaults: Timing, allow_probe: bool) -> Result<WorkloadSpec, Error> {
        validate_name(name)?;
        if self.image.trim().is_empty() {
            return Err(Error::spec(
                INVALID_SPEC,
                format!("'{name}' must declare an image"),
            ));
        }

        let ports = self
            .ports
            .iter()
            .map(|token| token.0.parse::<PortMap>())
            .collect::<Result<Vec<_>, _>>()?;

        let readiness_probe = match self.readiness_probe {
            Some(_) if !allow_probe => {
                warn!(app = %name, "readiness-probe is only honoured on services, ignoring");
                None
            }
            Some(probe) => Some(probe.resolve(name, defaults)?),
            None => None,
        };

        Ok(WorkloadSpec {
            image: self.image,
            ports,
            env: resolve_env(self.env),
            readiness_probe,
        })
    }
}

impl RawProbe {
    fn resolve(self, name: &str, defaults: Timing) -> Result<ProbeSpec, Error> {
        if self.command.is_empty() {
            return Err(Error::spec(
                INVALID_SPEC,
                format!("readiness-probe of '{name}' must declare a command"),
            ));
        }
        Ok(ProbeSpec {
            command: self.command.into_iter().map(|c| c.0).collect(),
            timing: Timing {
                period_seconds: self.period_seconds.unwrap_or(defaults.period_seconds),
                timeout_seconds: self
                    .start_deployment_timeout_seconds
                    .unwrap_or(defaults.timeout_seconds),
            },
        })
    }
}

impl RawSetup {
    fn resolve(self, defaults: Timing) -> Result<SetupSpec, Error> {
        if self.image.trim().is_empty() {
            return Err(Error::spec(INVALID_SPEC, "setup must declare an image"));
        }
        Ok(SetupSpec {
            image: self.image,
            timing: Timing {
                period_seconds: self.period_seconds.unwrap_or(defaults.period_seconds),
                timeout_seconds: self.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            },
            env: resolve_env(self.env),
        })
    }
}

fn resolve_env(env: Vec<RawEnvVar>) -> Vec<EnvVar> {
    env.into_iter()
        .map(|var| EnvVar {
            name: var.name,
            value: var.value.0,
        })
        .collect()
}
