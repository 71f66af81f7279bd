//! certscan CLI library

pub mod cluster;
pub mod error;
pub mod output;
pub mod scan;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;

use certscan::analyzer::{select_analyzer, AnalyzerMode, DEFAULT_OPENSSL_BINARY};
use certscan::client::KubeResourceClient;
use certscan::scanner::DEFAULT_CONCURRENCY;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use output::{OutputFormat, Printer};
use scan::ScanOptions;

/// certscan - report expiration dates of Istio gateway TLS certificates
#[derive(Parser, Debug)]
#[command(name = "certscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (default: in-cluster, $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Only scan this namespace (repeatable; default: all namespaces)
    #[arg(short, long = "namespace", value_name = "NAMESPACE")]
    pub namespaces: Vec<String>,

    /// How certificates are analyzed
    #[arg(long, value_enum, default_value_t = AnalyzerArg::Auto)]
    pub analyzer: AnalyzerArg,

    /// openssl binary used by the openssl analyzer
    #[arg(long, env = "CERTSCAN_OPENSSL", default_value = DEFAULT_OPENSSL_BINARY)]
    pub openssl: PathBuf,

    /// Gateways (and secrets per gateway) scanned at once
    #[arg(long, env = "CERTSCAN_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Log format (logs go to stderr; level via RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Certificate analyzer selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AnalyzerArg {
    /// openssl if it can be run, native parsing otherwise
    #[default]
    Auto,
    /// Always use openssl
    Openssl,
    /// Always parse certificates in-process
    Native,
}

impl From<AnalyzerArg> for AnalyzerMode {
    fn from(arg: AnalyzerArg) -> Self {
        match arg {
            AnalyzerArg::Auto => AnalyzerMode::Auto,
            AnalyzerArg::Openssl => AnalyzerMode::Openssl,
            AnalyzerArg::Native => AnalyzerMode::Native,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// Structured JSON
    Json,
}

/// Parse `--concurrency`, rejecting zero.
pub fn parse_concurrency(s: &str) -> std::result::Result<usize, String> {
    let n: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid concurrency '{}', expected a positive integer", s))?;
    if n == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    Ok(n)
}

/// Initialize tracing on stderr, honoring `RUST_LOG` (default `info`).
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

impl Cli {
    /// Run the scan
    pub async fn run(self) -> Result<()> {
        let client = cluster::kube_client(self.kubeconfig.as_deref(), self.context.as_deref()).await?;
        let client = Arc::new(KubeResourceClient::new(client));
        let analyzer = select_analyzer(self.analyzer.into(), &self.openssl).await;

        let options = ScanOptions {
            include: self.namespaces,
            concurrency: self.concurrency,
        };
        let mut printer = Printer::new(self.output, std::io::stdout(), std::io::stderr());
        scan::scan_cluster(client, analyzer, &options, &mut printer).await?;
        Ok(())
    }
}
