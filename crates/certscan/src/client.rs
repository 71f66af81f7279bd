//! Read access to the cluster resources a scan needs
//!
//! Namespaces and secrets are strongly typed `k8s_openapi` resources.
//! Gateways are Istio custom resources and are read as [`DynamicObject`]s so
//! that unknown or partial server fields never fail deserialization.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::trace;

use crate::Error;

/// API group of Istio networking resources
pub const GATEWAY_GROUP: &str = "networking.istio.io";
/// API version used to read gateways
pub const GATEWAY_VERSION: &str = "v1alpha3";
/// Gateway kind
pub const GATEWAY_KIND: &str = "Gateway";
/// Plural resource name used in API paths
pub const GATEWAY_PLURAL: &str = "gateways";

/// The `ApiResource` for `networking.istio.io/v1alpha3` gateways.
pub fn gateway_api_resource() -> ApiResource {
    ApiResource {
        group: GATEWAY_GROUP.to_string(),
        version: GATEWAY_VERSION.to_string(),
        api_version: format!("{}/{}", GATEWAY_GROUP, GATEWAY_VERSION),
        kind: GATEWAY_KIND.to_string(),
        plural: GATEWAY_PLURAL.to_string(),
    }
}

/// Trait abstracting the list/get operations used during a scan.
///
/// None of these calls are retried.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Names of all namespaces in the cluster
    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// All Istio gateways in `namespace`
    async fn list_gateways(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error>;

    /// Fetch a single secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error>;
}

/// [`ResourceClient`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    gateways: ApiResource,
}

impl KubeResourceClient {
    /// Wrap an already authenticated client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            gateways: gateway_api_resource(),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        trace!(count = list.items.len(), "listed namespaces");
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn list_gateways(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.gateways);
        let list = api.list(&ListParams::default()).await?;
        trace!(namespace, count = list.items.len(), "listed gateways");
        Ok(list.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
