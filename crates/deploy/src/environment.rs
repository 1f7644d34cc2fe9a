//! Environment configuration (spec §6 "Config (environment)").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub kind: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderScopes {
    #[serde(rename = "azure")]
    pub azure: Option<ProviderScope>,
    #[serde(rename = "aws")]
    pub aws: Option<ProviderScope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderScope {
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub template_kind: String,
    pub template_path: String,
    pub template_version: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSource {
    pub source: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformProviderBlock {
    #[serde(default)]
    pub additional_properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub secrets: Vec<SecretSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerraformRecipeConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, Vec<TerraformProviderBlock>>,
    #[serde(default)]
    pub env_secrets: BTreeMap<String, SecretSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecipeConfig {
    #[serde(default)]
    pub terraform: TerraformRecipeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub compute: Option<ComputeConfig>,
    #[serde(default)]
    pub providers: ProviderScopes,
    #[serde(default)]
    pub recipes: BTreeMap<String, RecipeEntry>,
    #[serde(default)]
    pub recipe_config: RecipeConfig,
}

/// A declarative bootstrap catalog of environments, keyed by the name a PRR
/// references via its `environment` field.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentRegistry {
    environments: BTreeMap<String, Environment>,
}

impl EnvironmentRegistry {
    pub fn from_list(environments: Vec<Environment>) -> Self {
        Self {
            environments: environments.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Environment> {
        self.environments.get(name).cloned()
    }
}
