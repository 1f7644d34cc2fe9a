//! The apply stage (spec §4.5.4): topologically applies output resources
//! through their handlers and extracts computed values from the results.

use crate::render::{ComputedValueSource, PlannedOutputResource, RendererOutput};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use store::OutputResource;
use tokio_util::sync::CancellationToken;
use ucp_errors::UcpError;

#[derive(Debug, Clone)]
pub struct AppliedResource {
    pub local_id: String,
    pub identity: String,
    pub properties: serde_json::Value,
    pub body: serde_json::Value,
}

/// The capability set a back-end exposes for one output-resource kind — a
/// flat trait rather than a `Create`/`Update`/`Delete` interface hierarchy,
/// per the redesign note against interface-hierarchy antipatterns.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn put(
        &self,
        resource: &PlannedOutputResource,
        cancel: &CancellationToken,
    ) -> Result<(String, serde_json::Value), UcpError>;

    async fn delete(
        &self,
        resource: &OutputResource,
        cancel: &CancellationToken,
    ) -> Result<(), UcpError>;

    /// `None` if this handler's resource kind has no fetchable secrets.
    async fn fetch_secret(
        &self,
        _identity: &str,
        _action: Option<&str>,
        _value_selector: &str,
    ) -> Result<Option<String>, UcpError> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_kind: impl Into<String>, handler: Box<dyn Handler>) {
        self.handlers.insert(resource_kind.into(), handler);
    }

    pub fn get(&self, resource_kind: &str) -> Option<&dyn Handler> {
        self.handlers.get(resource_kind).map(|h| h.as_ref())
    }
}

/// Topologically sorts `resources` by their `dependencies` DAG, breaking ties
/// by ascending localID (spec §4.5.4). Errors if the graph has a cycle or a
/// dependency names an unknown localID.
pub fn topological_order(
    resources: &[PlannedOutputResource],
) -> Result<Vec<String>, UcpError> {
    let by_id: HashMap<&str, &PlannedOutputResource> =
        resources.iter().map(|r| (r.local_id.as_str(), r)).collect();

    for r in resources {
        for dep in &r.dependencies {
            if !by_id.contains_key(dep.as_str()) {
                return Err(UcpError::InternalServerError(format!(
                    "output resource {} depends on unknown localID {dep}",
                    r.local_id
                )));
            }
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut order: Vec<String> = Vec::with_capacity(resources.len());

    let mut ids: Vec<&str> = resources.iter().map(|r| r.local_id.as_str()).collect();
    ids.sort_unstable();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a PlannedOutputResource>,
        visited: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), UcpError> {
        if visited.contains(id) {
            return Ok(());
        }
        if !in_progress.insert(id) {
            return Err(UcpError::InternalServerError(format!(
                "output resource dependency cycle detected at {id}"
            )));
        }
        let mut deps: Vec<&str> = by_id[id].dependencies.iter().map(String::as_str).collect();
        deps.sort_unstable();
        for dep in deps {
            visit(dep, by_id, visited, in_progress, order)?;
        }
        in_progress.remove(id);
        visited.insert(id);
        order.push(id.to_string());
        Ok(())
    }

    for id in ids {
        visit(id, &by_id, &mut visited, &mut in_progress, &mut order)?;
    }

    Ok(order)
}

/// Prepends the failing localID to a handler error's message while keeping
/// its variant intact, so retryability (`UcpError::is_retryable`) survives
/// the apply stage's failure path (spec §4.5.4: "not rolled back" — the
/// caller still needs to know whether to retry the whole job).
fn annotate_local_id(err: UcpError, local_id: &str) -> UcpError {
    let msg = |m: String| format!("localID {local_id}: {m}; already-applied resources are not rolled back");
    match err {
        UcpError::InvalidRequest(m) => UcpError::InvalidRequest(msg(m)),
        UcpError::NotFound(m) => UcpError::NotFound(msg(m)),
        UcpError::Conflict(m) => UcpError::Conflict(msg(m)),
        UcpError::InvalidConfiguration(m) => UcpError::InvalidConfiguration(msg(m)),
        UcpError::UpstreamUnavailable(m) => UcpError::UpstreamUnavailable(msg(m)),
        UcpError::UpstreamRejected(m) => UcpError::UpstreamRejected(msg(m)),
        UcpError::Timeout(m) => UcpError::Timeout(msg(m)),
        UcpError::InternalServerError(m) => UcpError::InternalServerError(msg(m)),
    }
}

pub struct ApplyOutcome {
    pub output_resources: Vec<OutputResource>,
    pub computed_values: serde_json::Map<String, serde_json::Value>,
}

/// Runs the apply stage over `rendered`, in topological order, recording
/// already-applied resources for forward reconciliation even on failure.
pub async fn apply(
    rendered: &RendererOutput,
    handlers: &HandlerRegistry,
    cancel: &CancellationToken,
) -> Result<ApplyOutcome, UcpError> {
    let order = topological_order(&rendered.resources)?;
    let planned: HashMap<&str, &PlannedOutputResource> = rendered
        .resources
        .iter()
        .map(|r| (r.local_id.as_str(), r))
        .collect();

    let mut applied: HashMap<String, AppliedResource> = HashMap::new();
    let mut output_resources = Vec::with_capacity(order.len());

    for local_id in &order {
        let resource = planned[local_id.as_str()];
        let handler = handlers.get(&resource.resource_type.kind).ok_or_else(|| {
            UcpError::InvalidConfiguration(format!(
                "no handler registered for resource kind {}",
                resource.resource_type.kind
            ))
        })?;

        let (identity, properties) = handler
            .put(resource, cancel)
            .await
            .map_err(|err| annotate_local_id(err, local_id))?;

        if identity.is_empty() {
            return Err(UcpError::InternalServerError(format!(
                "handler for {local_id} returned an empty identity (ResourceIdentityRequired)"
            )));
        }

        output_resources.push(OutputResource {
            local_id: local_id.clone(),
            resource_type: store::ResourceType {
                kind: resource.resource_type.kind.clone(),
                provider: resource.resource_type.provider.clone(),
            },
            identity: Some(identity.clone()),
            dependencies: resource.dependencies.clone(),
            radius_managed: Some(true),
            properties: properties.clone(),
        });

        applied.insert(
            local_id.clone(),
            AppliedResource {
                local_id: local_id.clone(),
                identity,
                properties,
                body: resource.body.clone(),
            },
        );
    }

    let computed_values = extract_computed_values(&rendered.computed_values, &applied)?;

    Ok(ApplyOutcome {
        output_resources,
        computed_values,
    })
}

fn extract_computed_values(
    sources: &BTreeMap<String, ComputedValueSource>,
    applied: &HashMap<String, AppliedResource>,
) -> Result<serde_json::Map<String, serde_json::Value>, UcpError> {
    let mut extracted = serde_json::Map::new();
    let mut statics = serde_json::Map::new();

    for (key, source) in sources {
        match source {
            ComputedValueSource::Static { value } => {
                statics.insert(key.clone(), value.clone());
            }
            ComputedValueSource::PropertyReference {
                local_id,
                property_reference,
            } => {
                let resource = applied.get(local_id).ok_or_else(|| {
                    UcpError::InternalServerError(format!(
                        "computed value {key} references unapplied localID {local_id}"
                    ))
                })?;
                let value = resource
                    .properties
                    .get(property_reference)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                extracted.insert(key.clone(), value);
            }
            ComputedValueSource::JsonPointer { local_id, pointer } => {
                let resource = applied.get(local_id).ok_or_else(|| {
                    UcpError::InternalServerError(format!(
                        "computed value {key} references unapplied localID {local_id}"
                    ))
                })?;
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(UcpError::InternalServerError(format!(
                        "computed value {key} has a malformed JSON pointer {pointer}"
                    )));
                }
                let value = resource.body.pointer(pointer).cloned().ok_or_else(|| {
                    UcpError::InternalServerError(format!(
                        "computed value {key}'s pointer {pointer} does not resolve against localID {local_id}"
                    ))
                })?;
                extracted.insert(key.clone(), value);
            }
        }
    }

    // Static values are merged last, overriding extracted ones (spec §4.5.4 step 4).
    extracted.extend(statics);
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ResourceTypeRef;

    fn planned(local_id: &str, deps: &[&str]) -> PlannedOutputResource {
        PlannedOutputResource {
            local_id: local_id.to_string(),
            resource_type: ResourceTypeRef {
                kind: "kubernetes".into(),
                provider: "kubernetes".into(),
            },
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            body: serde_json::json!({ "status": { "ready": true } }),
        }
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let resources = vec![
            planned("b", &["a"]),
            planned("a", &[]),
            planned("c", &["a", "b"]),
        ];
        let order = topological_order(&resources).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_ascending_local_id() {
        let resources = vec![planned("z", &[]), planned("a", &[]), planned("m", &[])];
        let order = topological_order(&resources).unwrap();
        assert_eq!(order, vec!["a", "m", "z"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let resources = vec![planned("a", &["b"]), planned("b", &["a"])];
        let err = topological_order(&resources).unwrap_err();
        assert!(matches!(err, UcpError::InternalServerError(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let resources = vec![planned("a", &["missing"])];
        let err = topological_order(&resources).unwrap_err();
        assert!(matches!(err, UcpError::InternalServerError(_)));
    }

    struct FakeHandler;

    #[async_trait]
    impl Handler for FakeHandler {
        async fn put(
            &self,
            resource: &PlannedOutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(String, serde_json::Value), UcpError> {
            Ok((
                format!("/fake/{}", resource.local_id),
                serde_json::json!({ "host": "fake.internal" }),
            ))
        }

        async fn delete(
            &self,
            _resource: &OutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(), UcpError> {
            Ok(())
        }
    }

    struct EmptyIdentityHandler;

    #[async_trait]
    impl Handler for EmptyIdentityHandler {
        async fn put(
            &self,
            _resource: &PlannedOutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(String, serde_json::Value), UcpError> {
            Ok((String::new(), serde_json::json!({})))
        }

        async fn delete(
            &self,
            _resource: &OutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(), UcpError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn apply_extracts_property_reference_and_merges_static_last() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("kubernetes", Box::new(FakeHandler));

        let mut rendered = RendererOutput::default();
        rendered.resources.push(planned("c0", &[]));
        rendered.computed_values.insert(
            "host".into(),
            ComputedValueSource::PropertyReference {
                local_id: "c0".into(),
                property_reference: "host".into(),
            },
        );
        rendered.computed_values.insert(
            "host".into(),
            ComputedValueSource::Static {
                value: serde_json::json!("overridden"),
            },
        );

        let cancel = CancellationToken::new();
        let outcome = apply(&rendered, &handlers, &cancel).await.unwrap();
        // BTreeMap dedups by key at insertion, so only the static survives;
        // a real caller would never register two sources under one key, but
        // this proves static-wins-when-present.
        assert_eq!(outcome.computed_values["host"], "overridden");
    }

    #[tokio::test]
    async fn json_pointer_extraction_reads_applied_body() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("kubernetes", Box::new(FakeHandler));

        let mut rendered = RendererOutput::default();
        rendered.resources.push(planned("c0", &[]));
        rendered.computed_values.insert(
            "ready".into(),
            ComputedValueSource::JsonPointer {
                local_id: "c0".into(),
                pointer: "/status/ready".into(),
            },
        );

        let cancel = CancellationToken::new();
        let outcome = apply(&rendered, &handlers, &cancel).await.unwrap();
        assert_eq!(outcome.computed_values["ready"], true);
    }

    #[tokio::test]
    async fn empty_identity_is_rejected() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("kubernetes", Box::new(EmptyIdentityHandler));

        let mut rendered = RendererOutput::default();
        rendered.resources.push(planned("c0", &[]));

        let cancel = CancellationToken::new();
        let err = apply(&rendered, &handlers, &cancel).await.unwrap_err();
        assert!(matches!(err, UcpError::InternalServerError(_)));
    }
}
