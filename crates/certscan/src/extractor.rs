//! Resolve the TLS secrets a gateway terminates with
//!
//! Extraction is all-or-nothing per gateway: a malformed server list or a
//! secret that cannot be fetched aborts the whole gateway, never just the
//! offending server.

use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, trace};

use crate::client::ResourceClient;
use crate::gateway::{parse_servers, ServerTls};

/// Errors that abort secret extraction for one gateway
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// `spec.servers` is absent
    #[error("error getting gateway servers: gateway {gateway} has no spec.servers")]
    MissingServers {
        /// Gateway name
        gateway: String,
    },

    /// `spec.servers` is present but not a list
    #[error("error getting gateway servers: gateway {gateway}: {reason}")]
    MalformedServers {
        /// Gateway name
        gateway: String,
        /// What was wrong with it
        reason: String,
    },

    /// A server entry is not an object
    #[error("invalid server object found at spec.servers[{index}] of gateway {gateway}")]
    MalformedServer {
        /// Gateway name
        gateway: String,
        /// Position of the entry in the list
        index: usize,
    },

    /// A referenced secret could not be fetched
    #[error("error getting secret {credential_name} in namespace {namespace}: {source}")]
    SecretFetch {
        /// Namespace the secret was looked up in
        namespace: String,
        /// Secret name from `tls.credentialName`
        credential_name: String,
        /// Cause reported by the resource client
        source: crate::Error,
    },
}

impl ExtractionError {
    /// Create a missing-servers error
    pub fn missing_servers(gateway: impl Into<String>) -> Self {
        Self::MissingServers {
            gateway: gateway.into(),
        }
    }

    /// Create a malformed-servers error
    pub fn malformed_servers(gateway: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedServers {
            gateway: gateway.into(),
            reason: reason.into(),
        }
    }
}

/// Fetch every secret referenced by a TLS-terminating server of `gateway`.
///
/// Secrets are read from the gateway's own namespace, falling back to
/// `namespace` (the namespace the gateway was listed in) when the object
/// carries none. Results follow server order and are not deduplicated.
pub async fn extract_secrets<C: ResourceClient + ?Sized>(
    client: &C,
    gateway: &DynamicObject,
    namespace: &str,
) -> Result<Vec<Secret>, ExtractionError> {
    let servers = parse_servers(gateway)?;
    let secret_namespace = gateway.namespace().unwrap_or_else(|| namespace.to_string());

    let mut secrets = Vec::new();
    for server in &servers {
        let Some(credential_name) = server.credential_name() else {
            trace!(gateway = %gateway.name_any(), ?server, "skipping server");
            continue;
        };

        let secret = client
            .get_secret(&secret_namespace, credential_name)
            .await
            .map_err(|source| ExtractionError::SecretFetch {
                namespace: secret_namespace.clone(),
                credential_name: credential_name.to_string(),
                source,
            })?;
        secrets.push(secret);
    }

    debug!(
        gateway = %gateway.name_any(),
        namespace = %secret_namespace,
        servers = servers.len(),
        terminated = terminated_count(&servers),
        secrets = secrets.len(),
        "extracted gateway secrets"
    );
    Ok(secrets)
}

/// Number of servers that reference a secret
fn terminated_count(servers: &[ServerTls]) -> usize {
    servers.iter().filter(|s| s.credential_name().is_some()).count()
}
