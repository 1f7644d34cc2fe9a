//! The secret fetch stage (spec §4.5.6): runs after apply, resolving each
//! declared secret value to its plaintext.

use crate::apply::Handler;
use crate::render::SecretValuePlan;
use std::collections::BTreeMap;
use store::OutputResource;
use ucp_errors::UcpError;

/// Transforms a raw fetched secret into its final form (spec §4.5.6: "pass
/// the raw secret through the matching transformer"). Keyed by
/// `transformerType` in a small built-in registry.
pub trait SecretTransformer: Send + Sync {
    fn transform(&self, raw: &str) -> Result<String, UcpError>;
}

#[derive(Default)]
pub struct TransformerRegistry {
    transformers: BTreeMap<String, Box<dyn SecretTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, transformer: Box<dyn SecretTransformer>) {
        self.transformers.insert(name.into(), transformer);
    }
}

/// Resolves `secret_values` against the resources applied by C5's apply
/// stage. `identities` maps localID to the handler that applied it and its
/// back-end identity, so a secret reference can be routed to the right
/// handler's `fetch_secret`.
pub async fn fetch_secrets(
    secret_values: &BTreeMap<String, SecretValuePlan>,
    applied: &BTreeMap<String, (String, &dyn Handler)>,
    transformers: &TransformerRegistry,
) -> Result<BTreeMap<String, String>, UcpError> {
    let mut resolved = BTreeMap::new();

    for (key, plan) in secret_values {
        let raw = if let Some(inline) = &plan.inline_value {
            inline.clone()
        } else {
            let (identity, handler) = applied.get(&plan.local_id).ok_or_else(|| {
                UcpError::InternalServerError(format!(
                    "secret value {key} references unapplied localID {}",
                    plan.local_id
                ))
            })?;
            handler
                .fetch_secret(identity, plan.action.as_deref(), &plan.value_selector)
                .await?
                .ok_or_else(|| {
                    UcpError::NotFound(format!(
                        "secret value {key} not found on localID {}",
                        plan.local_id
                    ))
                })?
        };

        let value = match &plan.transformer_type {
            None => raw,
            Some(name) => {
                let transformer = transformers.transformers.get(name).ok_or_else(|| {
                    UcpError::InternalServerError(format!("unknown secret transformer {name}"))
                })?;
                transformer.transform(&raw)?
            }
        };

        resolved.insert(key.clone(), value);
    }

    Ok(resolved)
}

/// Converts resolved secrets and stable references into the persisted
/// `store::SecretValueReference` map kept on the PRR (spec §3).
pub fn to_secret_value_references(
    secret_values: &BTreeMap<String, SecretValuePlan>,
) -> BTreeMap<String, store::SecretValueReference> {
    secret_values
        .iter()
        .map(|(key, plan)| {
            (
                key.clone(),
                store::SecretValueReference {
                    local_id: plan.local_id.clone(),
                    value_selector: plan.value_selector.clone(),
                    action: plan.action.clone(),
                    transformer_type: plan.transformer_type.clone(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlannedOutputResource;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct FakeHandler(&'static str);

    #[async_trait]
    impl Handler for FakeHandler {
        async fn put(
            &self,
            _resource: &PlannedOutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(String, serde_json::Value), UcpError> {
            unreachable!()
        }

        async fn delete(
            &self,
            _resource: &OutputResource,
            _cancel: &CancellationToken,
        ) -> Result<(), UcpError> {
            unreachable!()
        }

        async fn fetch_secret(
            &self,
            _identity: &str,
            _action: Option<&str>,
            _value_selector: &str,
        ) -> Result<Option<String>, UcpError> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct UppercaseTransformer;
    impl SecretTransformer for UppercaseTransformer {
        fn transform(&self, raw: &str) -> Result<String, UcpError> {
            Ok(raw.to_uppercase())
        }
    }

    #[tokio::test]
    async fn inline_value_bypasses_handler() {
        let plans = BTreeMap::from([(
            "connectionString".to_string(),
            SecretValuePlan {
                local_id: "unused".into(),
                value_selector: "x".into(),
                action: None,
                transformer_type: None,
                inline_value: Some("sk-inline".into()),
            },
        )]);
        let applied = BTreeMap::new();
        let transformers = TransformerRegistry::new();

        let resolved = fetch_secrets(&plans, &applied, &transformers).await.unwrap();
        assert_eq!(resolved["connectionString"], "sk-inline");
    }

    #[tokio::test]
    async fn transformer_applies_to_fetched_secret() {
        let handler = FakeHandler("plain-secret");
        let plans = BTreeMap::from([(
            "apiKey".to_string(),
            SecretValuePlan {
                local_id: "c0".into(),
                value_selector: "key".into(),
                action: None,
                transformer_type: Some("uppercase".into()),
                inline_value: None,
            },
        )]);
        let applied: BTreeMap<String, (String, &dyn Handler)> =
            BTreeMap::from([("c0".to_string(), ("/fake/c0".to_string(), &handler as &dyn Handler))]);
        let mut transformers = TransformerRegistry::new();
        transformers.register("uppercase", Box::new(UppercaseTransformer));

        let resolved = fetch_secrets(&plans, &applied, &transformers).await.unwrap();
        assert_eq!(resolved["apiKey"], "PLAIN-SECRET");
    }

    #[tokio::test]
    async fn unknown_transformer_is_internal_server_error() {
        let handler = FakeHandler("plain-secret");
        let plans = BTreeMap::from([(
            "apiKey".to_string(),
            SecretValuePlan {
                local_id: "c0".into(),
                value_selector: "key".into(),
                action: None,
                transformer_type: Some("does-not-exist".into()),
                inline_value: None,
            },
        )]);
        let applied: BTreeMap<String, (String, &dyn Handler)> =
            BTreeMap::from([("c0".to_string(), ("/fake/c0".to_string(), &handler as &dyn Handler))]);
        let transformers = TransformerRegistry::new();

        let err = fetch_secrets(&plans, &applied, &transformers).await.unwrap_err();
        assert!(matches!(err, UcpError::InternalServerError(_)));
    }
}
