//! Certificate expiration inventory for Istio gateways
//!
//! Walks every tenant namespace of a cluster, finds the TLS secrets that
//! `networking.istio.io/v1alpha3` gateways terminate with, and reports the
//! not-after date of each certificate.
//!
//! # Public API
//!
//! - [`client::ResourceClient`], [`client::KubeResourceClient`]: cluster reads
//! - [`namespaces::select`]: which namespaces are scanned
//! - [`gateway::ServerTls`]: typed TLS policy of a gateway server
//! - [`extractor::extract_secrets`]: gateway → referenced secrets
//! - [`certificate::decode_certificate`]: secret → DER bytes
//! - [`analyzer::ExpiryAnalyzer`], [`analyzer::select_analyzer`]: DER → expiration date
//! - [`scanner::Scanner`]: the walk itself

pub mod analyzer;
pub mod certificate;
pub mod client;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod namespaces;
pub mod scanner;

pub use error::{Error, Result};
pub use scanner::{CertificateRecord, Diagnostic, ScanEvent, ScanSummary, Scanner};
