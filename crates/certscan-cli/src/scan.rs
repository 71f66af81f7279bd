//! The `certscan` run: list namespaces, select, scan, print

use std::io::Write;
use std::sync::Arc;

use certscan::analyzer::ExpiryAnalyzer;
use certscan::client::ResourceClient;
use certscan::{namespaces, ScanSummary, Scanner};
use tracing::info;

use crate::output::Printer;
use crate::{Error, Result};

/// What to scan and how wide to fan out
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Restrict the scan to these namespaces; empty means all
    pub include: Vec<String>,
    /// Gateways (and secrets per gateway) processed at once
    pub concurrency: usize,
}

/// Scan the cluster behind `client`, printing every event as it is emitted.
///
/// Namespace listing and gateway listing failures abort the run. Output
/// already printed for earlier namespaces stays printed.
pub async fn scan_cluster<W: Write, E: Write>(
    client: Arc<dyn ResourceClient>,
    analyzer: Arc<dyn ExpiryAnalyzer>,
    options: &ScanOptions,
    printer: &mut Printer<W, E>,
) -> Result<ScanSummary> {
    let all = client
        .list_namespaces()
        .await
        .map_err(certscan::Error::namespace_list)?;
    let total = all.len();
    let selected = namespaces::select(all, &options.include);
    info!(total, selected = selected.len(), "scanning namespaces");

    let scanner = Scanner::new(client, analyzer).with_concurrency(options.concurrency);

    let mut write_error: Option<Error> = None;
    let summary = scanner
        .scan(&selected, |event| {
            if write_error.is_none() {
                write_error = printer.print(&event).err();
            }
        })
        .await?;

    if let Some(err) = write_error {
        return Err(err);
    }
    printer.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use async_trait::async_trait;
    use certscan::analyzer::AnalysisError;
    use certscan::client::gateway_api_resource;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::{DynamicObject, ObjectMeta};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory cluster: every listed namespace has one gateway `edge`
    /// terminating TLS with `<namespace>-cert`.
    struct FakeCluster {
        namespaces: Vec<String>,
        fail_namespaces: bool,
        listed: Mutex<Vec<String>>,
    }

    impl FakeCluster {
        fn new(namespaces: &[&str]) -> Self {
            Self {
                namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
                fail_namespaces: false,
                listed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResourceClient for FakeCluster {
        async fn list_namespaces(&self) -> std::result::Result<Vec<String>, certscan::Error> {
            if self.fail_namespaces {
                return Err(certscan::Error::internal("connection refused"));
            }
            Ok(self.namespaces.clone())
        }

        async fn list_gateways(
            &self,
            namespace: &str,
        ) -> std::result::Result<Vec<DynamicObject>, certscan::Error> {
            self.listed.lock().unwrap().push(namespace.to_string());
            let mut gw = DynamicObject::new("edge", &gateway_api_resource()).within(namespace);
            gw.data = json!({"spec": {"servers": [
                {"tls": {"mode": "SIMPLE", "credentialName": format!("{namespace}-cert")}}
            ]}});
            Ok(vec![gw])
        }

        async fn get_secret(
            &self,
            namespace: &str,
            name: &str,
        ) -> std::result::Result<Secret, certscan::Error> {
            let mut data = BTreeMap::new();
            data.insert(
                "tls.crt".to_string(),
                ByteString(b"-----BEGIN CERTIFICATE-----\nZGVy\n-----END CERTIFICATE-----\n".to_vec()),
            );
            Ok(Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                data: Some(data),
                ..Default::default()
            })
        }
    }

    struct FixedExpiry;

    #[async_trait]
    impl ExpiryAnalyzer for FixedExpiry {
        async fn not_after(&self, der: &[u8]) -> std::result::Result<String, AnalysisError> {
            assert_eq!(der, b"der");
            Ok("Jan 1 00:00:00 2030 GMT".to_string())
        }
    }

    fn options(include: &[&str]) -> ScanOptions {
        ScanOptions {
            include: include.iter().map(|s| s.to_string()).collect(),
            concurrency: 2,
        }
    }

    #[tokio::test]
    async fn reserved_namespaces_are_never_listed() {
        let cluster = Arc::new(FakeCluster::new(&["kube-system", "shop", "xcp-multicluster"]));
        let mut printer = Printer::new(OutputFormat::Text, Vec::new(), Vec::new());

        let summary = scan_cluster(cluster.clone(), Arc::new(FixedExpiry), &options(&[]), &mut printer)
            .await
            .unwrap();

        assert_eq!(*cluster.listed.lock().unwrap(), vec!["shop".to_string()]);
        assert_eq!(summary.certificates, 1);

        let (out, err) = printer.into_inner();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Certificate shop-cert in gateway edge in namespace shop expiration date is Jan 1 00:00:00 2030 GMT\n"
        );
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn include_filter_limits_the_scan() {
        let cluster = Arc::new(FakeCluster::new(&["a", "b", "c"]));
        let mut printer = Printer::new(OutputFormat::Text, Vec::new(), Vec::new());

        scan_cluster(cluster.clone(), Arc::new(FixedExpiry), &options(&["c", "a"]), &mut printer)
            .await
            .unwrap();

        assert_eq!(
            *cluster.listed.lock().unwrap(),
            vec!["a".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn namespace_listing_failure_is_fatal() {
        let mut cluster = FakeCluster::new(&["shop"]);
        cluster.fail_namespaces = true;
        let cluster = Arc::new(cluster);
        let mut printer = Printer::new(OutputFormat::Text, Vec::new(), Vec::new());

        let err = scan_cluster(cluster.clone(), Arc::new(FixedExpiry), &options(&[]), &mut printer)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "unable to get the list of namespaces: internal error: connection refused"
        );
        assert!(cluster.listed.lock().unwrap().is_empty());
        let (out, _) = printer.into_inner();
        assert!(out.is_empty());
    }
}
