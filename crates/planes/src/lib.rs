//! The plane registry (spec §4.2): a typed catalog of back-end planes with
//! per-plane route templates and credentials binding, populated from a
//! declarative config at bootstrap. Hot reload is not required.

use indexmap::IndexMap;
use resource_id::ResourceId;
use std::sync::RwLock;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneKind {
    Native,
    NonNative,
}

/// `(type, instance, kind, routes: namespace prefix -> upstream URL, credentialsRef?)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Plane {
    #[serde(rename = "type")]
    pub plane_type: String,
    pub instance: String,
    pub kind: PlaneKind,
    /// Maps a `providers/<namespace>` prefix to its upstream base URL.
    pub routes: IndexMap<String, Url>,
    pub credentials_ref: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaneError {
    #[error("plane {0}/{1} is not registered")]
    PlaneNotFound(String, String),
    #[error("plane {0}/{1} does not support {2}")]
    PlaneUnsupported(String, String, String),
    #[error("plane {0}/{1} has no route registered for namespace {2}")]
    NoRoute(String, String, String),
}

impl From<PlaneError> for ucp_errors::UcpError {
    fn from(err: PlaneError) -> Self {
        match &err {
            PlaneError::PlaneNotFound(..) => ucp_errors::UcpError::NotFound(err.to_string()),
            PlaneError::PlaneUnsupported(..) | PlaneError::NoRoute(..) => {
                ucp_errors::UcpError::InvalidConfiguration(err.to_string())
            }
        }
    }
}

/// Declarative bootstrap configuration: a flat list of planes, as would be
/// loaded from YAML/JSON at process start.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PlaneConfig {
    pub planes: Vec<Plane>,
}

fn key(plane_type: &str, instance: &str) -> (String, String) {
    (plane_type.to_ascii_lowercase(), instance.to_ascii_lowercase())
}

/// Typed catalog of registered planes. Populated once at bootstrap;
/// subsequent registration/credential-rotation calls take a short-lived
/// write lock (spec: "immutable credentialsRef may be rotated").
pub struct PlaneRegistry {
    planes: RwLock<IndexMap<(String, String), Plane>>,
}

impl PlaneRegistry {
    pub fn new() -> Self {
        Self {
            planes: RwLock::new(IndexMap::new()),
        }
    }

    pub fn from_config(config: PlaneConfig) -> Self {
        let registry = Self::new();
        for plane in config.planes {
            registry.register(plane);
        }
        registry
    }

    /// Registers (or replaces) a plane. This is the only mutation path other
    /// than [`PlaneRegistry::rotate_credentials`].
    pub fn register(&self, plane: Plane) {
        let k = key(&plane.plane_type, &plane.instance);
        self.planes.write().unwrap().insert(k, plane);
    }

    /// Rotates the credentials reference of an already-registered plane.
    pub fn rotate_credentials(
        &self,
        plane_type: &str,
        instance: &str,
        credentials_ref: Option<String>,
    ) -> Result<(), PlaneError> {
        let k = key(plane_type, instance);
        let mut planes = self.planes.write().unwrap();
        let plane = planes
            .get_mut(&k)
            .ok_or_else(|| PlaneError::PlaneNotFound(plane_type.to_string(), instance.to_string()))?;
        plane.credentials_ref = credentials_ref;
        Ok(())
    }

    pub fn lookup(&self, plane_type: &str, instance: &str) -> Result<Plane, PlaneError> {
        let k = key(plane_type, instance);
        self.planes
            .read()
            .unwrap()
            .get(&k)
            .cloned()
            .ok_or_else(|| PlaneError::PlaneNotFound(plane_type.to_string(), instance.to_string()))
    }

    pub fn list(&self) -> Vec<Plane> {
        self.planes.read().unwrap().values().cloned().collect()
    }

    /// Resolves the upstream URL and plane kind for a resource ID, by
    /// looking up its plane and matching its provider namespace against the
    /// plane's route table.
    pub fn resolve_upstream(&self, id: &ResourceId) -> Result<(Url, PlaneKind), PlaneError> {
        let plane = self.lookup(id.plane_type(), id.plane_instance())?;
        let namespace = id.provider_namespace().unwrap_or("");

        let route = plane
            .routes
            .iter()
            .find(|(prefix, _)| namespace.eq_ignore_ascii_case(prefix.as_str()))
            .map(|(_, url)| url.clone())
            .ok_or_else(|| {
                PlaneError::NoRoute(
                    id.plane_type().to_string(),
                    id.plane_instance().to_string(),
                    namespace.to_string(),
                )
            })?;

        Ok((route, plane.kind))
    }
}

impl Default for PlaneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plane() -> Plane {
        Plane {
            plane_type: "radius".into(),
            instance: "local".into(),
            kind: PlaneKind::Native,
            routes: IndexMap::from([(
                "Applications.Core".to_string(),
                Url::parse("http://radius-rp.local").unwrap(),
            )]),
            credentials_ref: None,
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = PlaneRegistry::new();
        registry.register(sample_plane());
        assert!(registry.lookup("Radius", "LOCAL").is_ok());
    }

    #[test]
    fn unknown_plane_fails() {
        let registry = PlaneRegistry::new();
        assert!(matches!(
            registry.lookup("aws", "aws"),
            Err(PlaneError::PlaneNotFound(..))
        ));
    }

    #[test]
    fn resolve_upstream_matches_namespace() {
        let registry = PlaneRegistry::new();
        registry.register(sample_plane());
        let id = ResourceId::parse(
            "/planes/radius/local/resourceGroups/rg0/providers/Applications.Core/environments/env0",
        )
        .unwrap();
        let (url, kind) = registry.resolve_upstream(&id).unwrap();
        assert_eq!(url.as_str(), "http://radius-rp.local/");
        assert_eq!(kind, PlaneKind::Native);
    }

    #[test]
    fn resolve_upstream_missing_route_is_unsupported() {
        let registry = PlaneRegistry::new();
        registry.register(sample_plane());
        let id = ResourceId::parse(
            "/planes/radius/local/resourceGroups/rg0/providers/Other.Namespace/things/t0",
        )
        .unwrap();
        assert!(matches!(
            registry.resolve_upstream(&id),
            Err(PlaneError::NoRoute(..))
        ));
    }

    #[test]
    fn credential_rotation() {
        let registry = PlaneRegistry::new();
        registry.register(sample_plane());
        registry
            .rotate_credentials("radius", "local", Some("vault://new".into()))
            .unwrap();
        assert_eq!(
            registry.lookup("radius", "local").unwrap().credentials_ref,
            Some("vault://new".into())
        );
    }
}
