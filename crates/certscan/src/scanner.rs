//! Walk namespaces and gateways, reporting certificate expiration dates
//!
//! # Failure boundaries
//!
//! - Listing gateways in a namespace fails: the whole scan stops with an
//!   [`Error`]. Events of earlier namespaces have already been emitted,
//!   nothing of the failing namespace or any later one is.
//! - Extracting secrets of one gateway fails: a
//!   [`Diagnostic::GatewayFailed`] is emitted and the scan continues.
//! - Decoding or analyzing one secret fails: a [`Diagnostic::SecretFailed`] is
//!   emitted and the gateway's remaining secrets are still processed.
//!
//! # Concurrency
//!
//! Namespaces are listed one after another while the gateways already listed
//! are scanned through one bounded `buffered` stream, and a gateway's secrets
//! through another. Events of a gateway are emitted as soon as it and every
//! gateway before it are done, so emission order always equals the sequential
//! order: namespaces as given, gateways as listed, secrets in server order.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzer::ExpiryAnalyzer;
use crate::certificate::{decode_certificate, CertificateError};
use crate::client::ResourceClient;
use crate::extractor::{extract_secrets, ExtractionError};
use crate::Error;

/// Default number of gateways (and secrets per gateway) in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Expiration date of one certificate referenced by one gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    /// Namespace the gateway was listed in
    pub namespace: String,
    /// Gateway name
    pub gateway: String,
    /// Secret holding the certificate
    pub secret: String,
    /// Not-after date as reported by the analyzer
    pub expiry: String,
}

impl fmt::Display for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Certificate {} in gateway {} in namespace {} expiration date is {}",
            self.secret, self.gateway, self.namespace, self.expiry
        )
    }
}

/// A recoverable failure, scoped to one gateway or one secret
#[derive(Debug)]
pub enum Diagnostic {
    /// Secrets of a gateway could not be extracted; the gateway was skipped
    GatewayFailed {
        /// Namespace
        namespace: String,
        /// Gateway name
        gateway: String,
        /// Cause
        error: ExtractionError,
    },
    /// One certificate could not be analyzed; the secret was skipped
    SecretFailed {
        /// Namespace
        namespace: String,
        /// Gateway name
        gateway: String,
        /// Secret name
        secret: String,
        /// Cause
        error: CertificateError,
    },
}

impl Diagnostic {
    /// Namespace the failure happened in
    pub fn namespace(&self) -> &str {
        match self {
            Self::GatewayFailed { namespace, .. } | Self::SecretFailed { namespace, .. } => {
                namespace
            }
        }
    }

    /// Gateway the failure happened in
    pub fn gateway(&self) -> &str {
        match self {
            Self::GatewayFailed { gateway, .. } | Self::SecretFailed { gateway, .. } => gateway,
        }
    }

    /// Secret the failure is scoped to, if any
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::GatewayFailed { .. } => None,
            Self::SecretFailed { secret, .. } => Some(secret),
        }
    }

    /// The underlying cause as text
    pub fn cause(&self) -> String {
        match self {
            Self::GatewayFailed { error, .. } => error.to_string(),
            Self::SecretFailed { error, .. } => error.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GatewayFailed {
                namespace,
                gateway,
                error,
            } => write!(
                f,
                "error getting secrets for gateway {} in namespace {}: {}",
                gateway, namespace, error
            ),
            Self::SecretFailed {
                namespace,
                gateway,
                secret,
                error,
            } => write!(
                f,
                "error analyzing certificate {} for gateway {} in namespace {}: {}",
                secret, gateway, namespace, error
            ),
        }
    }
}

/// Something a scan reports
#[derive(Debug)]
pub enum ScanEvent {
    /// A certificate and its expiration date
    Certificate(CertificateRecord),
    /// A recoverable failure
    Diagnostic(Diagnostic),
}

/// Totals of a completed scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Namespaces whose gateways were listed
    pub namespaces: usize,
    /// Gateways found
    pub gateways: usize,
    /// Certificates reported
    pub certificates: usize,
    /// Recoverable failures reported
    pub diagnostics: usize,
}

/// One unit of work in the flattened namespace/gateway walk
enum Step<'a> {
    /// Gateways of a namespace were listed
    Listed { gateways: usize },
    /// Gateways of a namespace could not be listed
    Failed(Error),
    /// A listed gateway still to be scanned
    Gateway {
        namespace: &'a str,
        gateway: DynamicObject,
    },
}

/// What a [`Step`] produced
enum Progress {
    Listed { gateways: usize },
    Events(Vec<ScanEvent>),
}

/// Walks namespaces and gateways and analyzes every referenced certificate
pub struct Scanner {
    client: Arc<dyn ResourceClient>,
    analyzer: Arc<dyn ExpiryAnalyzer>,
    concurrency: usize,
}

impl Scanner {
    /// Create a scanner with [`DEFAULT_CONCURRENCY`]
    pub fn new(client: Arc<dyn ResourceClient>, analyzer: Arc<dyn ExpiryAnalyzer>) -> Self {
        Self {
            client,
            analyzer,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the fan-out width; values below 1 are treated as 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Scan `namespaces`, handing each event to `emit` as soon as its gateway
    /// is complete and every earlier gateway has been emitted.
    pub async fn scan<F>(&self, namespaces: &[String], mut emit: F) -> Result<ScanSummary, Error>
    where
        F: FnMut(ScanEvent),
    {
        let mut summary = ScanSummary::default();
        let mut progress = pin!(stream::iter(namespaces)
            .then(|namespace| self.list_namespace(namespace))
            .flat_map(stream::iter)
            .map(|step| self.run_step(step))
            .buffered(self.concurrency));

        while let Some(next) = progress.next().await {
            match next? {
                Progress::Listed { gateways } => {
                    summary.namespaces += 1;
                    summary.gateways += gateways;
                }
                Progress::Events(events) => {
                    for event in events {
                        match &event {
                            ScanEvent::Certificate(_) => summary.certificates += 1,
                            ScanEvent::Diagnostic(_) => summary.diagnostics += 1,
                        }
                        emit(event);
                    }
                }
            }
        }

        info!(
            namespaces = summary.namespaces,
            gateways = summary.gateways,
            certificates = summary.certificates,
            diagnostics = summary.diagnostics,
            "scan complete"
        );
        Ok(summary)
    }

    /// List the gateways of `namespace` as steps of the walk. A listing
    /// failure becomes a single [`Step::Failed`].
    async fn list_namespace<'a>(&self, namespace: &'a str) -> Vec<Step<'a>> {
        match self.client.list_gateways(namespace).await {
            Ok(gateways) => {
                debug!(namespace, count = gateways.len(), "scanning gateways");
                let mut steps = Vec::with_capacity(gateways.len() + 1);
                steps.push(Step::Listed {
                    gateways: gateways.len(),
                });
                steps.extend(
                    gateways
                        .into_iter()
                        .map(|gateway| Step::Gateway { namespace, gateway }),
                );
                steps
            }
            Err(e) => vec![Step::Failed(Error::gateway_list(namespace, e))],
        }
    }

    async fn run_step(&self, step: Step<'_>) -> Result<Progress, Error> {
        match step {
            Step::Listed { gateways } => Ok(Progress::Listed { gateways }),
            Step::Failed(e) => Err(e),
            Step::Gateway { namespace, gateway } => {
                Ok(Progress::Events(self.scan_gateway(namespace, &gateway).await))
            }
        }
    }

    /// Report every certificate of one gateway. Never fails; problems become
    /// diagnostics.
    pub async fn scan_gateway(&self, namespace: &str, gateway: &DynamicObject) -> Vec<ScanEvent> {
        let gateway_name = gateway.name_any();

        let secrets = match extract_secrets(self.client.as_ref(), gateway, namespace).await {
            Ok(secrets) => secrets,
            Err(error) => {
                debug!(namespace, gateway = %gateway_name, error = %error, "gateway skipped");
                return vec![ScanEvent::Diagnostic(Diagnostic::GatewayFailed {
                    namespace: namespace.to_string(),
                    gateway: gateway_name,
                    error,
                })];
            }
        };

        let results: Vec<_> = stream::iter(&secrets)
            .map(|secret| self.analyze_secret(secret))
            .buffered(self.concurrency)
            .collect()
            .await;

        secrets
            .iter()
            .zip(results)
            .map(|(secret, result)| {
                let secret = secret.name_any();
                match result {
                    Ok(expiry) => ScanEvent::Certificate(CertificateRecord {
                        namespace: namespace.to_string(),
                        gateway: gateway_name.clone(),
                        secret,
                        expiry,
                    }),
                    Err(error) => {
                        debug!(namespace, gateway = %gateway_name, secret = %secret, error = %error, "secret skipped");
                        ScanEvent::Diagnostic(Diagnostic::SecretFailed {
                            namespace: namespace.to_string(),
                            gateway: gateway_name.clone(),
                            secret,
                            error,
                        })
                    }
                }
            })
            .collect()
    }

    /// Decode the certificate in `secret` and determine its expiration date
    pub async fn analyze_secret(&self, secret: &Secret) -> Result<String, CertificateError> {
        let der = decode_certificate(secret)?;
        Ok(self.analyzer.not_after(&der).await?)
    }
}
