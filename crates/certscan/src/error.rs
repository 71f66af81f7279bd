//! Error types for certificate scans
//!
//! Only errors in this module abort a scan. Per-gateway and per-secret
//! failures have their own types ([`ExtractionError`](crate::extractor::ExtractionError),
//! [`CertificateError`](crate::certificate::CertificateError)) and are
//! reported as diagnostics instead.

use thiserror::Error;

/// Fatal scan errors
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Listing namespaces failed
    #[error("unable to get the list of namespaces: {source}")]
    NamespaceList {
        /// Cause reported by the resource client
        source: Box<Error>,
    },

    /// Listing gateways in one namespace failed
    #[error("unable to list gateways in namespace {namespace}: {source}")]
    GatewayList {
        /// Namespace whose gateways could not be listed
        namespace: String,
        /// Cause reported by the resource client
        source: Box<Error>,
    },

    /// Failure reported by a [`ResourceClient`](crate::client::ResourceClient)
    /// that is not backed by kube-rs
    #[error("internal error: {message}")]
    Internal {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an internal error, e.g. from a custom resource client
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Wrap a namespace listing failure
    pub fn namespace_list(source: Error) -> Self {
        Self::NamespaceList {
            source: Box::new(source),
        }
    }

    /// Wrap a gateway listing failure for `namespace`
    pub fn gateway_list(namespace: impl Into<String>, source: Error) -> Self {
        Self::GatewayList {
            namespace: namespace.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for scan operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
