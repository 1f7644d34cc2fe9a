//! Distinguishes portable resource types (handled by the async deployment
//! processor, spec §4.3 point 5) from resource-provider-native types on the
//! `radius` plane (handled by the ordinary reverse proxy, spec §4.3 point 3
//! and S1) — both live under the same plane.

use std::collections::BTreeSet;

#[derive(Default)]
pub struct PortableTypeRegistry {
    types: BTreeSet<(String, String)>,
}

impl PortableTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: &str, type_name: &str) {
        self.types
            .insert((namespace.to_ascii_lowercase(), type_name.to_ascii_lowercase()));
    }

    pub fn is_portable(&self, namespace: &str, type_name: &str) -> bool {
        self.types
            .contains(&(namespace.to_ascii_lowercase(), type_name.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = PortableTypeRegistry::new();
        registry.register("Applications.Datastores", "mongoDatabases");
        assert!(registry.is_portable("applications.datastores", "mongodatabases"));
        assert!(!registry.is_portable("Applications.Core", "environments"));
    }
}
