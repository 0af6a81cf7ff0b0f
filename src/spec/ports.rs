//! Port-mapping tokens
//!
//! A token is either `"N"` (service port and container port are the same) or
//! `"N:M"` (service port N forwards to container port M).

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Service port forwarding to a container port
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortMap {
    /// Port exposed by the Service
    pub port: u16,
    /// Port the container listens on
    pub target_port: u16,
}

impl PortMap {
    /// Create a port mapping
    pub fn new(port: u16, target_port: u16) -> Self {
        Self { port, target_port }
    }
}

impl FromStr for PortMap {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.split_once(':') {
            Some((port, target)) => Ok(Self::new(parse_port(port)?, parse_port(target)?)),
            None => {
                let port = parse_port(token)?;
                Ok(Self::new(port, port))
            }
        }
    }
}

impl fmt::Display for PortMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == self.target_port {
            write!(f, "{}", self.port)
        } else {
            write!(f, "{}:{}", self.port, self.target_port)
        }
    }
}

/// Parse one numeric segment; the integer parser's message is kept verbatim.
fn parse_port(segment: &str) -> Result<u16, Error> {
    let port = segment.parse::<u16>().map_err(Error::parse_yaml)?;
    if port == 0 {
        return Err(Error::parse_yaml(format!(
            "port must be greater than zero: {segment:?}"
        )));
    }
    Ok(port)
}
