//! The render stage (spec §4.5.2): a pure, deterministic mapping from a
//! manual resource spec to a set of output resources plus computed/secret
//! value plans. Renderers must never perform I/O — their trait methods are
//! synchronous for exactly that reason.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use ucp_errors::UcpError;

/// A reference to a value produced later, at apply time, by an output
/// resource's handler — or a value known statically at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ComputedValueSource {
    /// A literal value, known without consulting any applied output.
    Static { value: serde_json::Value },
    /// Extracted from the applying handler's `properties` map by key.
    PropertyReference {
        local_id: String,
        property_reference: String,
    },
    /// Extracted from the handler's serialized resource body by JSON Pointer.
    JsonPointer {
        local_id: String,
        pointer: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretValuePlan {
    pub local_id: String,
    pub value_selector: String,
    pub action: Option<String>,
    pub transformer_type: Option<String>,
    /// If set, used verbatim without consulting any back-end (spec §4.5.6).
    pub inline_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTypeRef {
    pub kind: String,
    pub provider: String,
}

/// A render-time output resource, not yet applied to any back-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedOutputResource {
    pub local_id: String,
    pub resource_type: ResourceTypeRef,
    pub dependencies: Vec<String>,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RendererOutput {
    pub resources: Vec<PlannedOutputResource>,
    pub computed_values: BTreeMap<String, ComputedValueSource>,
    pub secret_values: BTreeMap<String, SecretValuePlan>,
}

#[derive(Debug, Clone)]
pub struct RenderInput<'a> {
    pub resource_id: &'a str,
    pub resource_type: &'a str,
    pub metadata: &'a serde_json::Value,
    pub namespace: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub environment_namespace: String,
}

/// A pure function from `(resource, renderOptions)` to [`RendererOutput`].
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        input: &RenderInput<'_>,
        options: &RenderOptions,
    ) -> Result<RendererOutput, UcpError>;
}

#[derive(Default)]
pub struct RendererRegistry {
    renderers: BTreeMap<String, Box<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: impl Into<String>, renderer: Box<dyn Renderer>) {
        self.renderers.insert(resource_type.into(), renderer);
    }

    pub fn render(
        &self,
        resource_type: &str,
        input: &RenderInput<'_>,
        options: &RenderOptions,
    ) -> Result<RendererOutput, UcpError> {
        let renderer = self.renderers.get(resource_type).ok_or_else(|| {
            UcpError::InvalidConfiguration(format!("no renderer registered for {resource_type}"))
        })?;
        let output = renderer.render(input, options)?;
        for r in &output.resources {
            if r.resource_type.provider.is_empty() {
                return Err(UcpError::InvalidConfiguration(format!(
                    "output resource {} has no provider",
                    r.local_id
                )));
            }
        }
        Ok(output)
    }
}

/// Computes a localID that depends only on `role` and `inputs`, never on
/// wall-clock time or any remote identifier (spec §4.5.2 "Stable localIDs").
pub fn stable_local_id(role: &str, inputs: &impl Serialize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.as_bytes());
    hasher.update(b"\0");
    let canonical =
        serde_json::to_vec(inputs).expect("inputs to stable_local_id must be serializable");
    hasher.update(&canonical);
    let digest = hasher.finalize();
    format!("{role}-{}", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRenderer;

    impl Renderer for EchoRenderer {
        fn render(
            &self,
            input: &RenderInput<'_>,
            _options: &RenderOptions,
        ) -> Result<RendererOutput, UcpError> {
            let local_id = stable_local_id("container", &input.resource_id);
            Ok(RendererOutput {
                resources: vec![PlannedOutputResource {
                    local_id: local_id.clone(),
                    resource_type: ResourceTypeRef {
                        kind: "kubernetes".into(),
                        provider: "kubernetes".into(),
                    },
                    dependencies: Vec::new(),
                    body: serde_json::json!({ "name": input.resource_id }),
                }],
                computed_values: BTreeMap::new(),
                secret_values: BTreeMap::new(),
            })
        }
    }

    #[test]
    fn render_is_deterministic() {
        let renderer = EchoRenderer;
        let input = RenderInput {
            resource_id: "/planes/radius/local/.../containers/c0",
            resource_type: "Applications.Core/containers",
            metadata: &serde_json::json!({}),
            namespace: "radius-test",
        };
        let options = RenderOptions::default();

        let a = renderer.render(&input, &options).unwrap();
        let b = renderer.render(&input, &options).unwrap();
        assert_eq!(a.resources[0].local_id, b.resources[0].local_id);
        assert_eq!(a.resources[0].dependencies, b.resources[0].dependencies);
    }

    #[test]
    fn unknown_provider_fails_the_stage() {
        struct BadRenderer;
        impl Renderer for BadRenderer {
            fn render(
                &self,
                _input: &RenderInput<'_>,
                _options: &RenderOptions,
            ) -> Result<RendererOutput, UcpError> {
                Ok(RendererOutput {
                    resources: vec![PlannedOutputResource {
                        local_id: "x".into(),
                        resource_type: ResourceTypeRef {
                            kind: "k".into(),
                            provider: "".into(),
                        },
                        dependencies: vec![],
                        body: serde_json::json!({}),
                    }],
                    ..Default::default()
                })
            }
        }
        let mut registry = RendererRegistry::new();
        registry.register("Test/type", Box::new(BadRenderer));
        let input = RenderInput {
            resource_id: "id",
            resource_type: "Test/type",
            metadata: &serde_json::json!({}),
            namespace: "ns",
        };
        let err = registry
            .render("Test/type", &input, &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, UcpError::InvalidConfiguration(_)));
    }
}
