//! Control-plane endpoint resolution.

use std::fmt;

use tracing::info;
use url::{Host, Url};

use super::document::RawConfig;
use crate::error::{ConfigError, Error, UrlError};

/// The remote control-plane endpoint of the active cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterEndpoint {
    pub host: String,
    pub port: u16,
    pub scheme: String,
}

impl ClusterEndpoint {
    /// Returns true if the endpoint uses TLS.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Parses a server URL into host, port and scheme.
///
/// A missing port defaults to 443 for `https` and 80 otherwise.
pub fn parse_endpoint(server: &str) -> Result<ClusterEndpoint, UrlError> {
    let url = Url::parse(server).map_err(|e| match e {
        url::ParseError::InvalidPort => UrlError::Port(server.to_string()),
        other => UrlError::Parse {
            url: server.to_string(),
            reason: other.to_string(),
        },
    })?;

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => {
            return Err(UrlError::Parse {
                url: server.to_string(),
                reason: "missing host".to_string(),
            })
        }
    };

    let scheme = url.scheme().to_string();
    let port = url
        .port()
        .unwrap_or(if scheme == "https" { 443 } else { 80 });

    Ok(ClusterEndpoint { host, port, scheme })
}

/// Resolves the active cluster's endpoint from a raw kubeconfig.
pub fn resolve(config: &RawConfig) -> Result<ClusterEndpoint, Error> {
    let context = config
        .current_context()
        .ok_or(ConfigError::NoActiveContext)?;
    info!(context = context, "Using context");

    let cluster = config
        .context_cluster(context)
        .ok_or_else(|| ConfigError::ContextNotFound(context.to_string()))?;

    if !config.has_cluster(cluster) {
        return Err(ConfigError::ClusterNotFound(cluster.to_string()).into());
    }

    let server = config.cluster_server(cluster).unwrap_or_default();
    let endpoint = parse_endpoint(server)?;
    info!(cluster = cluster, endpoint = %endpoint, "Resolved control-plane endpoint");

    Ok(endpoint)
}
