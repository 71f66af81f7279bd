//! Namespace selection for scans
//!
//! Some namespaces are never scanned regardless of what the caller asks for.

/// Namespaces that are always excluded from a scan
pub const EXCLUDED: &[&str] = &["kube-system", "xcp-multicluster"];

/// Whether `namespace` is on the fixed exclusion list
pub fn is_excluded(namespace: &str) -> bool {
    EXCLUDED.contains(&namespace)
}

/// Pick the namespaces to scan from everything the cluster reported.
///
/// Cluster order is preserved. When `include` is non-empty only namespaces
/// named there are kept; excluded namespaces are dropped either way.
pub fn select(all: Vec<String>, include: &[String]) -> Vec<String> {
    all.into_iter()
        .filter(|ns| !is_excluded(ns))
        .filter(|ns| include.is_empty() || include.iter().any(|i| i == ns))
        .collect()
}
