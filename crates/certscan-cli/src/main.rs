//! certscan
//!
//! Reports the expiration date of every TLS certificate referenced by an
//! Istio gateway in the cluster.

use clap::Parser;

use certscan_cli::{init_tracing, Cli, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    cli.run().await
}
