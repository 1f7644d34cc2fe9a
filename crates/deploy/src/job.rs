//! Wires render → recipe → apply → secret-fetch → persist into the
//! `automations::Executor` contract, one impl per verb (spec §4.5.1, §4.5.8).

use crate::apply::{apply, HandlerRegistry};
use crate::environment::Environment;
use crate::recipe::{DeploymentEngine, OciRegistryClient, SecretStore};
use crate::render::{RenderInput, RenderOptions, RendererRegistry};
use crate::secret::{fetch_secrets, to_secret_value_references, TransformerRegistry};
use async_trait::async_trait;
use automations::{Executor, JobId, PollOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use store::{Etag, PortableResourceRecord, ProvisioningState, Store};
use tokio_util::sync::CancellationToken;
use ucp_errors::UcpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Put,
    Patch,
    Delete,
}

/// Job state persisted across poll/sleep cycles — just enough to resume
/// after a crash without redoing completed stages (spec §4.5.8).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeployJobState {
    pub resource_id: String,
}

/// Validates a PRR's provisioning fields (spec §8 S5: manual+recipe rejection
/// reports all violations at once, not just the first).
pub fn validate_prr(prr: &PortableResourceRecord) -> Result<(), UcpError> {
    let mut violations = Vec::new();

    let is_manual = matches!(prr.resource_provisioning, store::ResourceProvisioning::Manual);
    if is_manual && prr.recipe.is_some() {
        violations.push("recipe field must not be set when resourceProvisioning is manual".to_string());
    }
    if is_manual {
        if let Some(manual) = &prr.manual {
            if manual.metadata.is_null() {
                violations.push("manual.metadata is required".to_string());
            }
            if manual.type_name.is_empty() {
                violations.push("manual.type is required".to_string());
            }
            if manual.version.is_empty() {
                violations.push("manual.version is required".to_string());
            }
        } else {
            violations.push("manual specification is required when resourceProvisioning is manual".to_string());
        }
    }
    if !is_manual && prr.recipe.is_none() {
        violations.push("recipe field is required when resourceProvisioning is recipe".to_string());
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(UcpError::InvalidRequest(violations.join("; ")))
    }
}

fn resource_group_from_id(id: &str) -> Option<String> {
    id.split("/resourceGroups/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .map(|s| s.to_string())
}

pub struct DeployExecutor<S: Store> {
    pub verb: Verb,
    pub store: Arc<S>,
    pub environments: Arc<dyn Fn(&str) -> Option<Environment> + Send + Sync>,
    pub renderers: Arc<RendererRegistry>,
    pub handlers: Arc<HandlerRegistry>,
    pub oci: Arc<dyn OciRegistryClient>,
    pub deployment_engine: Arc<dyn DeploymentEngine>,
    pub secrets: Arc<dyn SecretStore>,
    pub transformers: Arc<TransformerRegistry>,
}

impl<S: Store> DeployExecutor<S> {
    async fn set_state(
        &self,
        id: &str,
        etag: Option<Etag>,
        mutate: impl FnOnce(&mut PortableResourceRecord),
    ) -> Result<Etag, UcpError> {
        let record = self
            .store
            .get_prr(id)
            .await?
            .ok_or_else(|| UcpError::NotFound(format!("portable resource {id} not found")))?;
        let mut data = record.data;
        mutate(&mut data);
        self.store.put_prr(id, data, etag.as_ref()).await
    }

    async fn run_put_or_patch(&self, id: &str) -> anyhow::Result<PollOutcome> {
        let record = self
            .store
            .get_prr(id)
            .await?
            .ok_or_else(|| UcpError::NotFound(format!("portable resource {id} not found")))?;

        validate_prr(&record.data)?;

        let in_progress_state = if self.verb == Verb::Patch {
            ProvisioningState::Updating
        } else {
            ProvisioningState::Provisioning
        };
        let etag = self
            .set_state(id, Some(record.etag.clone()), |d| {
                d.async_provisioning_state = in_progress_state;
            })
            .await?;

        let env = (self.environments)(&record.data.environment).ok_or_else(|| {
            UcpError::InvalidConfiguration(format!(
                "environment {} is not registered",
                record.data.environment
            ))
        })?;

        let outcome = self.provision(&record.data, &env).await;

        match outcome {
            Ok((output_resources, computed_values, secret_refs, recipe_status)) => {
                self.set_state(id, Some(etag), |d| {
                    d.async_provisioning_state = ProvisioningState::Succeeded;
                    d.output_resources = output_resources;
                    d.computed_values = computed_values;
                    d.secret_values = secret_refs;
                    d.recipe_status = recipe_status;
                })
                .await?;
            }
            Err(err) => {
                self.set_state(id, Some(etag), |d| {
                    d.async_provisioning_state = ProvisioningState::Failed;
                })
                .await?;
                return Err(err.into());
            }
        }

        Ok(PollOutcome::Done)
    }

    async fn provision(
        &self,
        prr: &PortableResourceRecord,
        env: &Environment,
    ) -> Result<
        (
            Vec<store::OutputResource>,
            serde_json::Map<String, serde_json::Value>,
            BTreeMap<String, store::SecretValueReference>,
            Option<store::RecipeStatus>,
        ),
        UcpError,
    > {
        let cancel = CancellationToken::new();

        match prr.resource_provisioning {
            store::ResourceProvisioning::Manual => {
                let manual = prr
                    .manual
                    .as_ref()
                    .expect("validate_prr guarantees manual is present");
                let options = RenderOptions {
                    environment_namespace: env
                        .compute
                        .as_ref()
                        .map(|c| c.namespace.clone())
                        .unwrap_or_default(),
                };
                let input = RenderInput {
                    resource_id: &prr.id,
                    resource_type: &manual.type_name,
                    metadata: &manual.metadata,
                    namespace: &options.environment_namespace,
                };
                let rendered = self.renderers.render(&manual.type_name, &input, &options)?;
                let applied = apply(&rendered, &self.handlers, &cancel).await?;

                // Resolve secrets now so a bad reference fails the job rather
                // than surfacing only when a caller later asks for the value.
                let mut identities: BTreeMap<String, (String, &dyn crate::apply::Handler)> =
                    BTreeMap::new();
                for resource in &applied.output_resources {
                    if let Some(identity) = &resource.identity {
                        if let Some(handler) = self.handlers.get(&resource.resource_type.kind) {
                            identities.insert(resource.local_id.clone(), (identity.clone(), handler));
                        }
                    }
                }
                fetch_secrets(&rendered.secret_values, &identities, &self.transformers).await?;

                Ok((
                    applied.output_resources,
                    applied.computed_values,
                    to_secret_value_references(&rendered.secret_values),
                    None,
                ))
            }
            store::ResourceProvisioning::Recipe => {
                let recipe = prr
                    .recipe
                    .as_ref()
                    .expect("validate_prr guarantees recipe is present");
                let definition = crate::recipe::resolve_recipe_definition(env, &recipe.name)?;

                let template = match definition.template_kind.as_str() {
                    "bicep" => {
                        crate::recipe::fetch_bicep_template(self.oci.as_ref(), &definition.template_path)
                            .await?
                    }
                    "terraform" => serde_json::json!({
                        "templatePath": definition.template_path,
                        "templateVersion": definition.template_version,
                    }),
                    other => {
                        return Err(UcpError::InvalidConfiguration(format!(
                            "unsupported recipe templateKind {other}"
                        )))
                    }
                };

                let provider_config = if definition.template_kind == "terraform" {
                    crate::recipe::build_provider_config(env, self.secrets.as_ref())?
                } else {
                    Default::default()
                };

                let parameters = recipe
                    .parameters
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let resource_group = resource_group_from_id(&prr.id).unwrap_or_default();
                let merged = crate::recipe::merge_recipe_parameters(
                    &parameters,
                    &prr.tenant,
                    &resource_group,
                    &env.name,
                    prr.application.as_deref(),
                );

                let request = crate::recipe::DeploymentRequest {
                    template_kind: definition.template_kind.clone(),
                    template,
                    parameters: merged,
                    provider_config,
                };
                let result = self.deployment_engine.deploy(request).await?;

                let output_resources = result
                    .output_resource_ids
                    .into_iter()
                    .map(|backend_id| store::OutputResource {
                        local_id: backend_id.clone(),
                        resource_type: store::ResourceType {
                            kind: "recipe".into(),
                            provider: definition.template_kind.clone(),
                        },
                        identity: Some(backend_id),
                        dependencies: Vec::new(),
                        radius_managed: Some(true),
                        properties: serde_json::json!({}),
                    })
                    .collect();

                Ok((
                    output_resources,
                    serde_json::Map::new(),
                    BTreeMap::new(),
                    Some(store::RecipeStatus {
                        template_kind: definition.template_kind,
                        template_path: definition.template_path,
                        template_version: definition.template_version,
                    }),
                ))
            }
        }
    }

    async fn run_delete(&self, id: &str) -> anyhow::Result<PollOutcome> {
        let record = match self.store.get_prr(id).await? {
            None => return Ok(PollOutcome::Done),
            Some(r) => r,
        };

        let etag = self
            .set_state(id, Some(record.etag.clone()), |d| {
                d.async_provisioning_state = ProvisioningState::Deleting;
            })
            .await?;

        let order = crate::apply::topological_order(
            &record
                .data
                .output_resources
                .iter()
                .map(|o| crate::render::PlannedOutputResource {
                    local_id: o.local_id.clone(),
                    resource_type: crate::render::ResourceTypeRef {
                        kind: o.resource_type.kind.clone(),
                        provider: o.resource_type.provider.clone(),
                    },
                    dependencies: o.dependencies.clone(),
                    body: serde_json::json!({}),
                })
                .collect::<Vec<_>>(),
        )?;

        let by_local_id: BTreeMap<&str, &store::OutputResource> = record
            .data
            .output_resources
            .iter()
            .map(|o| (o.local_id.as_str(), o))
            .collect();

        let cancel = CancellationToken::new();
        for local_id in order.iter().rev() {
            let resource = by_local_id.get(local_id.as_str()).ok_or_else(|| {
                UcpError::InternalServerError(format!(
                    "delete stage: output resource {local_id} missing from dependency record"
                ))
            })?;
            let handler = self.handlers.get(&resource.resource_type.kind).ok_or_else(|| {
                UcpError::InvalidConfiguration(format!(
                    "no handler registered for resource kind {}",
                    resource.resource_type.kind
                ))
            })?;
            match handler.delete(resource, &cancel).await {
                Ok(()) => {}
                Err(UcpError::NotFound(_)) => {}
                Err(err) => {
                    self.set_state(id, Some(etag.clone()), |d| {
                        d.async_provisioning_state = ProvisioningState::Failed;
                    })
                    .await?;
                    return Err(err.into());
                }
            }
        }

        self.store.delete_prr(id, Some(&etag)).await?;
        Ok(PollOutcome::Done)
    }
}

#[async_trait]
impl<S: Store + 'static> Executor for DeployExecutor<S> {
    type State = DeployJobState;

    async fn poll(
        &self,
        job_id: &JobId,
        state: &mut Self::State,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<PollOutcome> {
        if state.resource_id.is_empty() {
            state.resource_id = job_id.clone();
        }
        tracing::debug!(resource_id = %state.resource_id, verb = ?self.verb, "polling deploy job");
        let outcome = match self.verb {
            Verb::Put | Verb::Patch => self.run_put_or_patch(&state.resource_id).await,
            Verb::Delete => self.run_delete(&state.resource_id).await,
        };
        if let Err(err) = &outcome {
            tracing::warn!(resource_id = %state.resource_id, verb = ?self.verb, %err, "deploy job step failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_prr(recipe_set: bool) -> PortableResourceRecord {
        PortableResourceRecord {
            id: "/planes/radius/local/resourceGroups/rg/providers/Applications.Datastores/mongoDatabases/db0".into(),
            name: "db0".into(),
            tenant: "t0".into(),
            environment: "env0".into(),
            application: None,
            async_provisioning_state: ProvisioningState::Accepted,
            resource_provisioning: store::ResourceProvisioning::Manual,
            manual: None,
            recipe: if recipe_set {
                Some(store::RecipeSpec {
                    name: "mongo-azure".into(),
                    parameters: serde_json::json!({}),
                })
            } else {
                None
            },
            output_resources: vec![],
            computed_values: serde_json::Map::new(),
            secret_values: BTreeMap::new(),
            recipe_status: None,
        }
    }

    #[test]
    fn manual_with_recipe_and_missing_fields_reports_all_four_violations() {
        let mut prr = manual_prr(true);
        prr.manual = Some(store::ManualSpec {
            type_name: "".into(),
            version: "".into(),
            metadata: serde_json::Value::Null,
            resources: vec![],
        });
        let err = validate_prr(&prr).unwrap_err();
        let UcpError::InvalidRequest(message) = err else {
            panic!("expected InvalidRequest");
        };
        assert!(message.contains("recipe field must not be set"));
        assert!(message.contains("manual.metadata is required"));
        assert!(message.contains("manual.type is required"));
        assert!(message.contains("manual.version is required"));
    }

    #[test]
    fn valid_manual_passes() {
        let mut prr = manual_prr(false);
        prr.manual = Some(store::ManualSpec {
            type_name: "Applications.Core/containers".into(),
            version: "2023-10-01-preview".into(),
            metadata: serde_json::json!({"name": "db0"}),
            resources: vec![],
        });
        assert!(validate_prr(&prr).is_ok());
    }

    #[test]
    fn recipe_provisioning_requires_recipe_field() {
        let mut prr = manual_prr(false);
        prr.resource_provisioning = store::ResourceProvisioning::Recipe;
        let err = validate_prr(&prr).unwrap_err();
        assert!(matches!(err, UcpError::InvalidRequest(_)));
    }
}
