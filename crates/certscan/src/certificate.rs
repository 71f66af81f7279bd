//! Decode the certificate stored in a TLS secret
//!
//! The `tls.crt` entry holds a PEM certificate. Its envelope markers are
//! stripped and the remaining base64 body is decoded into DER bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

use crate::analyzer::AnalysisError;

/// Secret data key holding the certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// PEM header removed before decoding, including its line break
pub const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----\n";

/// PEM footer removed before decoding, including the preceding line break
pub const PEM_FOOTER: &str = "\n-----END CERTIFICATE-----";

/// Errors turning a secret into certificate bytes
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The secret has no `tls.crt` entry
    #[error("{key} not found in secret")]
    MissingKey {
        /// The key that was looked up
        key: &'static str,
    },

    /// The body is not valid base64
    #[error("error decoding certificate data: {source}")]
    Base64 {
        /// Underlying decoder error
        #[from]
        source: base64::DecodeError,
    },
}

/// Why one secret could not be reported
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The certificate could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The expiration date could not be determined
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Extract the DER bytes of the certificate stored in `secret`.
pub fn decode_certificate(secret: &Secret) -> Result<Vec<u8>, DecodeError> {
    let data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TLS_CERT_KEY))
        .ok_or(DecodeError::MissingKey { key: TLS_CERT_KEY })?;

    decode_pem_body(&data.0)
}

/// Strip the literal PEM markers from `pem` and base64-decode the rest.
///
/// Line breaks left in the body are ignored. Nothing else is cleaned up, so
/// payloads without the exact markers usually fail to decode.
pub fn decode_pem_body(pem: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let text = String::from_utf8_lossy(pem)
        .replace(PEM_HEADER, "")
        .replace(PEM_FOOTER, "");

    let body: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    Ok(STANDARD.decode(body)?)
}
