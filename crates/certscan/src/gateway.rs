//! Typed view of the TLS settings on an Istio gateway
//!
//! Gateways arrive as loosely typed JSON. The server list is parsed here once
//! into [`ServerTls`] values so the rest of the scan never inspects raw JSON.
//! Only `spec.servers[].tls.mode` and `spec.servers[].tls.credentialName` are
//! read; every other field is ignored.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::{Map, Value};

use crate::extractor::ExtractionError;

/// TLS mode under which the gateway forwards encrypted traffic untouched
pub const PASSTHROUGH_MODE: &str = "PASSTHROUGH";

/// TLS policy of a single gateway server block
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerTls {
    /// No `tls` object on the server
    NoTls,
    /// `tls.mode` is `PASSTHROUGH`; no certificate is involved
    PassThrough,
    /// `tls` is present but `mode` is absent or not a string
    ModeUnset,
    /// Terminating mode without a usable `credentialName`
    MissingCredential {
        /// The configured mode
        mode: String,
    },
    /// TLS is terminated with the certificate in `credential_name`
    Terminated {
        /// The configured mode (e.g. `SIMPLE`, `MUTUAL`)
        mode: String,
        /// Name of the secret holding the certificate
        credential_name: String,
    },
}

impl ServerTls {
    /// Classify one server object
    pub fn from_server(server: &Map<String, Value>) -> Self {
        let Some(tls) = server.get("tls").and_then(Value::as_object) else {
            return Self::NoTls;
        };

        let mode = match tls.get("mode").and_then(Value::as_str) {
            None => return Self::ModeUnset,
            Some(PASSTHROUGH_MODE) => return Self::PassThrough,
            Some(mode) => mode.to_string(),
        };

        match tls.get("credentialName").and_then(Value::as_str) {
            Some(name) => Self::Terminated {
                mode,
                credential_name: name.to_string(),
            },
            None => Self::MissingCredential { mode },
        }
    }

    /// The referenced secret name, only for terminated servers
    pub fn credential_name(&self) -> Option<&str> {
        match self {
            Self::Terminated {
                credential_name, ..
            } => Some(credential_name),
            _ => None,
        }
    }
}

/// Parse the TLS policy of every server of `gateway`, in declaration order.
///
/// Fails when `spec.servers` is missing or not a list, or when any entry is
/// not an object. One bad entry invalidates the whole gateway.
pub fn parse_servers(gateway: &DynamicObject) -> Result<Vec<ServerTls>, ExtractionError> {
    let name = gateway.name_any();

    let servers = match gateway.data.get("spec") {
        None => return Err(ExtractionError::missing_servers(name)),
        Some(spec) => match spec.as_object() {
            None => return Err(ExtractionError::malformed_servers(name, "spec is not an object")),
            Some(spec) => match spec.get("servers") {
                None => return Err(ExtractionError::missing_servers(name)),
                Some(servers) => servers,
            },
        },
    };

    let servers = servers
        .as_array()
        .ok_or_else(|| ExtractionError::malformed_servers(&name, "spec.servers is not a list"))?;

    servers
        .iter()
        .enumerate()
        .map(|(index, server)| {
            server
                .as_object()
                .map(ServerTls::from_server)
                .ok_or_else(|| ExtractionError::MalformedServer {
                    gateway: name.clone(),
                    index,
                })
        })
        .collect()
}
