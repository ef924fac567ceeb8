//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use regfleet_core::options::FORCE_DELETE_ANNOTATION;
use regfleet_core::{CliOptions, ProviderKind, Registry, RegistryRole, RegistrySpec};
use regfleet_reconciler::{ReconcileReport, UnitResult};
use regfleet_registry::{InMemoryRegistry, RegistryProvider};

/// Builds a registry value.
pub fn registry(name: &str, provider: ProviderKind, role: RegistryRole, force_delete: bool) -> Registry {
    let mut annotations = BTreeMap::new();
    annotations.insert(FORCE_DELETE_ANNOTATION.to_string(), force_delete.to_string());
    Registry::from_spec(
        RegistrySpec {
            name: name.to_string(),
            provider,
            api_endpoint: format!("https://{name}.example.com"),
            username: "admin".to_string(),
            password: "pw".to_string(),
            role,
            annotations,
        },
        &CliOptions::default(),
    )
}

/// A Harbor leaf registry without force delete.
pub fn harbor(name: &str) -> Registry {
    registry(name, ProviderKind::Harbor, RegistryRole::Local, false)
}

/// Type-erases in-memory backends for the reconciler.
pub fn providers(backends: &[&Arc<InMemoryRegistry>]) -> Vec<Arc<dyn RegistryProvider>> {
    backends
        .iter()
        .map(|backend| Arc::clone(backend) as Arc<dyn RegistryProvider>)
        .collect()
}

/// Finds a unit by its label.
pub fn unit<'a>(report: &'a ReconcileReport, label: &str) -> &'a UnitResult {
    report
        .units
        .iter()
        .find(|u| u.label() == label)
        .unwrap_or_else(|| panic!("no unit '{label}' in report: {report:#?}"))
}

/// Returns owned strings.
pub fn ops(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}
