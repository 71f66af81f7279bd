//! Determine when a certificate expires
//!
//! Two analyzers share the [`ExpiryAnalyzer`] contract (DER bytes in, opaque
//! not-after text out):
//!
//! - [`OpensslAnalyzer`] pipes the certificate through `openssl x509 -enddate`
//! - [`NativeAnalyzer`] parses it in-process with `x509-parser` and renders the
//!   date the way openssl prints it
//!
//! [`select_analyzer`] decides which one a scan uses.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default name of the openssl binary, resolved through `PATH`
pub const DEFAULT_OPENSSL_BINARY: &str = "openssl";

/// Prefix openssl puts in front of the expiration date
pub const NOT_AFTER_PREFIX: &str = "notAfter=";

/// Date layout of `openssl x509 -enddate`, e.g. `Jan  1 00:00:00 2030 GMT`
pub const OPENSSL_DATE_FORMAT: &str = "%b %e %H:%M:%S %Y GMT";

/// Errors determining a certificate's expiration date
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The external binary could not be run or fed
    #[error("failed to run {binary}: {source}")]
    Spawn {
        /// Binary that was invoked
        binary: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The external binary exited unsuccessfully
    #[error("openssl error: {status}: {output}")]
    Failed {
        /// Exit status as reported by the OS
        status: String,
        /// Combined stdout and stderr, verbatim
        output: String,
    },

    /// The external binary printed no date
    #[error("{binary} reported no expiration date")]
    EmptyOutput {
        /// Binary that was invoked
        binary: String,
    },

    /// The certificate could not be parsed natively
    #[error("failed to parse certificate: {message}")]
    Parse {
        /// Parser error description
        message: String,
    },
}

/// Trait for obtaining the not-after date of a DER certificate
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExpiryAnalyzer: Send + Sync {
    /// The certificate's expiration date as display text
    async fn not_after(&self, der: &[u8]) -> Result<String, AnalysisError>;
}

/// How the analyzer for a scan is chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnalyzerMode {
    /// Use openssl when it can be run, otherwise parse natively
    #[default]
    Auto,
    /// Always use openssl
    Openssl,
    /// Always parse natively
    Native,
}

/// Pick the analyzer for `mode`.
///
/// In [`AnalyzerMode::Auto`] the openssl binary is probed once with
/// `openssl version`; if that fails the native parser is used instead.
pub async fn select_analyzer(mode: AnalyzerMode, openssl_binary: &Path) -> Arc<dyn ExpiryAnalyzer> {
    match mode {
        AnalyzerMode::Native => Arc::new(NativeAnalyzer),
        AnalyzerMode::Openssl => Arc::new(OpensslAnalyzer::with_binary(openssl_binary)),
        AnalyzerMode::Auto => {
            let openssl = OpensslAnalyzer::with_binary(openssl_binary);
            if openssl.is_available().await {
                info!(binary = %openssl_binary.display(), "using openssl for certificate analysis");
                Arc::new(openssl)
            } else {
                warn!(
                    binary = %openssl_binary.display(),
                    "openssl not available, falling back to native certificate parsing"
                );
                Arc::new(NativeAnalyzer)
            }
        }
    }
}

// =============================================================================
// openssl
// =============================================================================

/// Analyzer that shells out to `openssl x509`
#[derive(Clone, Debug)]
pub struct OpensslAnalyzer {
    binary: PathBuf,
}

impl OpensslAnalyzer {
    /// Use `openssl` from `PATH`
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_OPENSSL_BINARY)
    }

    /// Use a specific openssl binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether `openssl version` runs successfully
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn binary_name(&self) -> String {
        self.binary.display().to_string()
    }
}

#[async_trait]
impl ExpiryAnalyzer for OpensslAnalyzer {
    async fn not_after(&self, der: &[u8]) -> Result<String, AnalysisError> {
        let mut child = Command::new(&self.binary)
            .args(["x509", "-inform", "DER", "-noout", "-enddate"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AnalysisError::Spawn {
                binary: self.binary_name(),
                source,
            })?;

        // openssl may exit before reading all input; a failed write only
        // matters when the exit status and output say nothing.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(der).await,
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| AnalysisError::Spawn {
                binary: self.binary_name(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(AnalysisError::Failed {
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }

        match parse_enddate(&String::from_utf8_lossy(&output.stdout)) {
            Some(date) => Ok(date),
            None => match written {
                Err(source) => Err(AnalysisError::Spawn {
                    binary: self.binary_name(),
                    source,
                }),
                Ok(()) => Err(AnalysisError::EmptyOutput {
                    binary: self.binary_name(),
                }),
            },
        }
    }
}

/// Extract the date from `openssl x509 -enddate` output.
///
/// Strips the `notAfter=` prefix and surrounding whitespace; the date itself
/// is passed through untouched. Returns `None` if nothing is left.
pub fn parse_enddate(output: &str) -> Option<String> {
    let date = output.strip_prefix(NOT_AFTER_PREFIX).unwrap_or(output).trim();
    (!date.is_empty()).then(|| date.to_string())
}

// =============================================================================
// native
// =============================================================================

/// Analyzer that parses certificates in-process
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeAnalyzer;

#[async_trait]
impl ExpiryAnalyzer for NativeAnalyzer {
    async fn not_after(&self, der: &[u8]) -> Result<String, AnalysisError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| AnalysisError::Parse {
            message: e.to_string(),
        })?;
        let not_after = cert.validity().not_after.timestamp();
        debug!(not_after, "parsed certificate validity");
        format_not_after(not_after)
    }
}

/// Render a unix timestamp in openssl's not-after layout
pub fn format_not_after(timestamp: i64) -> Result<String, AnalysisError> {
    let instant: DateTime<Utc> =
        DateTime::from_timestamp(timestamp, 0).ok_or_else(|| AnalysisError::Parse {
            message: format!("not-after timestamp {} is out of range", timestamp),
        })?;
    Ok(instant.format(OPENSSL_DATE_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_expiring(year: i32, month: u8, day: u8) -> Vec<u8> {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params =
            rcgen::CertificateParams::new(vec!["shop.example.com".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2024, 1, 1);
        params.not_after = rcgen::date_time_ymd(year, month, day);
        params.self_signed(&key).unwrap().der().to_vec()
    }

    // ==========================================================================
    // Story: Reading openssl output
    // ==========================================================================

    #[test]
    fn enddate_prefix_and_whitespace_are_trimmed() {
        assert_eq!(
            parse_enddate("notAfter=Jan  1 00:00:00 2030 GMT\n").as_deref(),
            Some("Jan  1 00:00:00 2030 GMT")
        );
    }

    #[test]
    fn enddate_without_prefix_is_passed_through() {
        assert_eq!(
            parse_enddate("  Dec 31 23:59:59 2029 GMT  ").as_deref(),
            Some("Dec 31 23:59:59 2029 GMT")
        );
    }

    #[test]
    fn empty_enddate_is_none() {
        assert_eq!(parse_enddate(""), None);
        assert_eq!(parse_enddate("notAfter=\n"), None);
    }

    // ==========================================================================
    // Story: Native parsing matches the openssl layout
    // ==========================================================================

    #[test]
    fn native_format_pads_single_digit_days() {
        // 2030-01-01T00:00:00Z
        assert_eq!(format_not_after(1_893_456_000).unwrap(), "Jan  1 00:00:00 2030 GMT");
        // 2029-12-31T23:59:59Z
        assert_eq!(format_not_after(1_893_455_999).unwrap(), "Dec 31 23:59:59 2029 GMT");
    }

    #[tokio::test]
    async fn native_analyzer_reads_not_after() {
        let der = cert_expiring(2030, 1, 1);
        let date = NativeAnalyzer.not_after(&der).await.unwrap();
        assert_eq!(date, "Jan  1 00:00:00 2030 GMT");
    }

    #[tokio::test]
    async fn native_analyzer_rejects_garbage() {
        let err = NativeAnalyzer.not_after(b"not a certificate").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
    }

    // ==========================================================================
    // Story: Running openssl
    // ==========================================================================

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let analyzer = OpensslAnalyzer::with_binary("/nonexistent/certscan-openssl");
        assert!(!analyzer.is_available().await);

        let err = analyzer.not_after(b"der").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/certscan-openssl"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let analyzer = OpensslAnalyzer::with_binary("false");
        let err = analyzer.not_after(b"der").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Failed { .. }));
        assert!(err.to_string().starts_with("openssl error"));
    }

    #[tokio::test]
    async fn openssl_reads_not_after_from_der_on_stdin() {
        let analyzer = OpensslAnalyzer::new();
        if !analyzer.is_available().await {
            eprintln!("openssl not installed, skipping");
            return;
        }

        let date = analyzer.not_after(&cert_expiring(2030, 1, 1)).await.unwrap();
        assert_eq!(date, "Jan  1 00:00:00 2030 GMT");
    }

    // ==========================================================================
    // Story: Choosing an analyzer
    // ==========================================================================

    #[tokio::test]
    async fn auto_falls_back_to_native_without_openssl() {
        let analyzer =
            select_analyzer(AnalyzerMode::Auto, Path::new("/nonexistent/certscan-openssl")).await;
        let date = analyzer.not_after(&cert_expiring(2031, 6, 15)).await.unwrap();
        assert_eq!(date, "Jun 15 00:00:00 2031 GMT");
    }

    #[tokio::test]
    async fn forced_openssl_does_not_fall_back() {
        let analyzer =
            select_analyzer(AnalyzerMode::Openssl, Path::new("/nonexistent/certscan-openssl")).await;
        let err = analyzer.not_after(&cert_expiring(2031, 6, 15)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Spawn { .. }));
    }

    #[tokio::test]
    async fn forced_native_ignores_openssl_path() {
        let analyzer = select_analyzer(AnalyzerMode::Native, Path::new("openssl")).await;
        let date = analyzer.not_after(&cert_expiring(2030, 1, 1)).await.unwrap();
        assert_eq!(date, "Jan  1 00:00:00 2030 GMT");
    }
}
