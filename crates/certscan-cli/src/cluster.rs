//! Cluster client bootstrap
//!
//! Resolution order:
//! 1. `--kubeconfig` and/or `--context` select a kubeconfig file and context
//! 2. otherwise kube defaults apply (in-cluster service account, `KUBECONFIG`,
//!    `~/.kube/config`)

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{CommandErrorExt, Error, Result};

/// Build a kube [`Client`] from the CLI's kubeconfig/context flags.
pub async fn kube_client(kubeconfig: Option<&str>, context: Option<&str>) -> Result<Client> {
    if kubeconfig.is_none() && context.is_none() {
        debug!("using default kube client configuration");
        return Client::try_default().await.cmd_err();
    }

    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let config = match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).map_err(|e| {
                Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e))
            })?;
            Config::from_custom_kubeconfig(kc, &options).await.cmd_err()?
        }
        None => Config::from_kubeconfig(&options).await.cmd_err()?,
    };

    debug!(cluster_url = %config.cluster_url, "built kube client configuration");
    Client::try_from(config).cmd_err()
}
