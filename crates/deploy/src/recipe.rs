//! Recipe resolution (spec §4.5.3, §4.5.5): resolving a recipe name to a
//! template, fetching it, and invoking the deployment engine as a black box.

use crate::environment::{Environment, SecretSource, TerraformProviderBlock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ucp_errors::UcpError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDefinition {
    pub template_kind: String,
    pub template_path: String,
    pub template_version: Option<String>,
}

pub fn resolve_recipe_definition(
    env: &Environment,
    recipe_name: &str,
) -> Result<RecipeDefinition, UcpError> {
    let entry = env.recipes.get(recipe_name).ok_or_else(|| {
        UcpError::InvalidConfiguration(format!(
            "recipe {recipe_name} is not registered in environment {}",
            env.name
        ))
    })?;
    Ok(RecipeDefinition {
        template_kind: entry.template_kind.clone(),
        template_path: entry.template_path.clone(),
        template_version: entry.template_version.clone(),
    })
}

/// An OCI registry client, abstracted so the bicep path is testable without a
/// live registry (spec §1: external collaborators are out of scope to model
/// in full; we own only the shape of the call).
#[async_trait]
pub trait OciRegistryClient: Send + Sync {
    /// Resolves `repository:tag` to a manifest digest, then the first layer's
    /// blob, returned as raw bytes (spec §4.5.3 step 2).
    async fn fetch_first_layer_blob(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<Vec<u8>, UcpError>;
}

pub fn parse_bicep_template_path(template_path: &str) -> Result<(String, String), UcpError> {
    match template_path.rsplit_once(':') {
        Some((repo, tag)) if !repo.is_empty() && !tag.is_empty() => {
            Ok((repo.to_string(), tag.to_string()))
        }
        _ => Err(UcpError::InvalidConfiguration(format!(
            "bicep templatePath {template_path} is not of the form repository:tag"
        ))),
    }
}

pub async fn fetch_bicep_template(
    registry: &dyn OciRegistryClient,
    template_path: &str,
) -> Result<serde_json::Value, UcpError> {
    let (repository, tag) = parse_bicep_template_path(template_path)?;
    let blob = registry.fetch_first_layer_blob(&repository, &tag).await?;
    serde_json::from_slice(&blob).map_err(|e| {
        UcpError::InvalidConfiguration(format!("bicep layer blob is not a JSON deployment template: {e}"))
    })
}

/// A resolved, merged provider-configuration block map (spec §4.5.5), ready
/// to be embedded in a Terraform working directory.
pub type ProviderConfigMap = BTreeMap<String, Vec<serde_json::Value>>;

pub trait SecretStore: Send + Sync {
    /// Returns `source.key`'s plaintext, or `None` if the key is absent.
    /// `NotFound` for the whole source (rather than the key) must still
    /// surface as `Ok(None)` here — callers distinguish via `source_exists`.
    fn lookup(&self, source: &SecretSource) -> Option<String>;
    fn source_exists(&self, source_id: &str) -> bool;
}

fn azure_provider_fields(scope: &str) -> Result<serde_json::Value, UcpError> {
    let sub = scope
        .split("/subscriptions/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .ok_or_else(|| {
            UcpError::InvalidConfiguration(format!("malformed azure provider scope: {scope}"))
        })?;
    let rg = scope
        .split("/resourceGroups/")
        .nth(1)
        .map(|rest| rest.to_string());
    let mut fields = serde_json::json!({ "subscription_id": sub });
    if let Some(rg) = rg {
        fields["resource_group_name"] = serde_json::Value::String(rg);
    }
    Ok(fields)
}

fn aws_provider_fields(scope: &str) -> Result<serde_json::Value, UcpError> {
    let account = scope
        .split("/accounts/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .ok_or_else(|| {
            UcpError::InvalidConfiguration(format!("malformed aws provider scope: {scope}"))
        })?;
    let region = scope
        .split("/regions/")
        .nth(1)
        .ok_or_else(|| {
            UcpError::InvalidConfiguration(format!("malformed aws provider scope: {scope}"))
        })?;
    Ok(serde_json::json!({ "allowed_account_ids": [account], "region": region }))
}

/// Builds the per-provider block map described in spec §4.5.5: UCP-configured
/// providers first (aws/azurerm/kubernetes, credentials best-effort from the
/// secret store), then recipe-scoped additional providers with placeholder
/// substitution from `secrets[sourceID].data[key]`.
pub fn build_provider_config(
    env: &Environment,
    secrets: &dyn SecretStore,
) -> Result<ProviderConfigMap, UcpError> {
    let mut map: ProviderConfigMap = BTreeMap::new();

    if let Some(azure) = &env.providers.azure {
        let mut fields = azure_provider_fields(&azure.scope)?;
        // Credentials are looked up by a conventional source id; NotFound
        // means "emit without credentials" (implicit chain credentials).
        for (field, key) in [
            ("client_id", "clientId"),
            ("client_secret", "clientSecret"),
            ("tenant_id", "tenantId"),
        ] {
            if let Some(v) = secrets.lookup(&SecretSource {
                source: "azure-credentials".into(),
                key: key.into(),
            }) {
                fields[field] = serde_json::Value::String(v);
            }
        }
        map.entry("azurerm".into()).or_default().push(fields);
    }

    if let Some(aws) = &env.providers.aws {
        let mut fields = aws_provider_fields(&aws.scope)?;
        for (field, key) in [
            ("access_key", "accessKeyId"),
            ("secret_key", "secretAccessKey"),
        ] {
            if let Some(v) = secrets.lookup(&SecretSource {
                source: "aws-credentials".into(),
                key: key.into(),
            }) {
                fields[field] = serde_json::Value::String(v);
            }
        }
        map.entry("aws".into()).or_default().push(fields);
    }

    for (provider_name, blocks) in &env.recipe_config.terraform.providers {
        for block in blocks {
            let resolved = resolve_provider_block(block, secrets)?;
            map.entry(provider_name.clone()).or_default().push(resolved);
        }
    }

    Ok(map)
}

fn resolve_provider_block(
    block: &TerraformProviderBlock,
    secrets: &dyn SecretStore,
) -> Result<serde_json::Value, UcpError> {
    let mut fields = serde_json::Value::Object(block.additional_properties.clone());
    for secret in &block.secrets {
        if !secrets.source_exists(&secret.source) {
            return Err(UcpError::InvalidConfiguration(format!(
                "secret store {} is not configured",
                secret.source
            )));
        }
        let value = secrets.lookup(secret).ok_or_else(|| {
            UcpError::InvalidConfiguration(format!(
                "secret store {} has no key {}",
                secret.source, secret.key
            ))
        })?;
        fields[&secret.key] = serde_json::Value::String(value);
    }
    Ok(fields)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub template_kind: String,
    pub template: serde_json::Value,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub provider_config: ProviderConfigMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub output_resource_ids: Vec<String>,
}

/// The deployment engine, invoked as a black box (spec §1: "Deliberately out
/// of scope: the ARM deployment engine"). We own only the call shape.
#[async_trait]
pub trait DeploymentEngine: Send + Sync {
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentResult, UcpError>;
}

pub fn merge_recipe_parameters(
    recipe_parameters: &serde_json::Map<String, serde_json::Value>,
    subscription_id: &str,
    resource_group: &str,
    environment: &str,
    application: Option<&str>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = recipe_parameters.clone();
    merged.insert("subscriptionID".into(), subscription_id.into());
    merged.insert("resourceGroup".into(), resource_group.into());
    merged.insert("environment".into(), environment.into());
    if let Some(app) = application {
        merged.insert("application".into(), app.into());
    }
    merged
}
