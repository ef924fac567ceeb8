//! Registry fixtures shared by unit tests.

use std::collections::BTreeMap;

use regfleet_core::options::FORCE_DELETE_ANNOTATION;
use regfleet_core::{CliOptions, ProviderKind, Registry, RegistryRole, RegistrySpec};

fn build(name: &str, provider: ProviderKind, role: RegistryRole, force_delete: bool) -> Registry {
    let mut annotations = BTreeMap::new();
    if force_delete {
        annotations.insert(FORCE_DELETE_ANNOTATION.to_string(), "true".to_string());
    }
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

/// A Harbor leaf registry.
pub fn registry(name: &str, force_delete: bool) -> Registry {
    build(name, ProviderKind::Harbor, RegistryRole::Local, force_delete)
}

/// A global hub of the given vendor.
pub fn hub(name: &str, provider: ProviderKind) -> Registry {
    build(name, provider, RegistryRole::GlobalHub, false)
}

/// A leaf registry of the given vendor.
pub fn leaf(name: &str, provider: ProviderKind) -> Registry {
    build(name, provider, RegistryRole::Local, false)
}
