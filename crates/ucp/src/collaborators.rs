//! Thin HTTP adapters to the external collaborators the spec names but
//! deliberately treats as black boxes (spec §1): an OCI registry, the
//! deployment engine, and the secret provider. We own only the call shape.

use async_trait::async_trait;
use deploy::environment::SecretSource;
use deploy::recipe::{DeploymentEngine, DeploymentRequest, DeploymentResult, OciRegistryClient, SecretStore};
use ucp_errors::UcpError;

pub struct HttpOciRegistryClient {
    client: reqwest::Client,
    registry_base: url::Url,
}

impl HttpOciRegistryClient {
    pub fn new(client: reqwest::Client, registry_base: url::Url) -> Self {
        Self { client, registry_base }
    }
}

#[async_trait]
impl OciRegistryClient for HttpOciRegistryClient {
    async fn fetch_first_layer_blob(&self, repository: &str, tag: &str) -> Result<Vec<u8>, UcpError> {
        let manifest_url = self
            .registry_base
            .join(&format!("v2/{repository}/manifests/{tag}"))
            .map_err(|e| UcpError::InvalidConfiguration(format!("bad OCI registry URL: {e}")))?;
        let manifest: serde_json::Value = self
            .client
            .get(manifest_url)
            .header("Accept", "application/vnd.oci.image.manifest.v1+json")
            .send()
            .await
            .map_err(|e| UcpError::UpstreamUnavailable(format!("OCI manifest fetch failed: {e}")))?
            .error_for_status()
            .map_err(|e| UcpError::UpstreamRejected(format!("OCI registry rejected manifest request: {e}")))?
            .json()
            .await
            .map_err(|e| UcpError::UpstreamRejected(format!("OCI manifest is not valid JSON: {e}")))?;

        let digest = manifest
            .get("layers")
            .and_then(|l| l.as_array())
            .and_then(|layers| layers.first())
            .and_then(|layer| layer.get("digest"))
            .and_then(|d| d.as_str())
            .ok_or_else(|| UcpError::UpstreamRejected("OCI manifest has no first layer digest".to_string()))?;

        let blob_url = self
            .registry_base
            .join(&format!("v2/{repository}/blobs/{digest}"))
            .map_err(|e| UcpError::InvalidConfiguration(format!("bad OCI registry URL: {e}")))?;
        let bytes = self
            .client
            .get(blob_url)
            .send()
            .await
            .map_err(|e| UcpError::UpstreamUnavailable(format!("OCI blob fetch failed: {e}")))?
            .error_for_status()
            .map_err(|e| UcpError::UpstreamRejected(format!("OCI registry rejected blob request: {e}")))?
            .bytes()
            .await
            .map_err(|e| UcpError::UpstreamRejected(format!("failed to read OCI blob: {e}")))?;

        Ok(bytes.to_vec())
    }
}

pub struct HttpDeploymentEngine {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpDeploymentEngine {
    pub fn new(client: reqwest::Client, base_url: url::Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl DeploymentEngine for HttpDeploymentEngine {
    async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentResult, UcpError> {
        let url = self
            .base_url
            .join("deployments")
            .map_err(|e| UcpError::InvalidConfiguration(format!("bad deployment engine URL: {e}")))?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| UcpError::UpstreamUnavailable(format!("deployment engine request failed: {e}")))?
            .error_for_status()
            .map_err(|e| UcpError::UpstreamRejected(format!("deployment engine rejected the request: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| UcpError::UpstreamRejected(format!("deployment engine returned malformed JSON: {e}")))
    }
}

/// Looks credentials up from process environment variables, named
/// `<SOURCE>_<KEY>` (both upper-cased, non-alphanumerics replaced with `_`).
/// A production deployment would point this at a real secret provider
/// instead; the shape of the trait is what the core depends on.
#[derive(Default)]
pub struct EnvSecretStore {
    known_sources: std::collections::BTreeSet<String>,
}

impl EnvSecretStore {
    pub fn new(known_sources: impl IntoIterator<Item = String>) -> Self {
        Self {
            known_sources: known_sources.into_iter().collect(),
        }
    }

    fn env_var_name(source: &str, key: &str) -> String {
        format!("{source}_{key}")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl SecretStore for EnvSecretStore {
    fn lookup(&self, source: &SecretSource) -> Option<String> {
        std::env::var(Self::env_var_name(&source.source, &source.key)).ok()
    }

    fn source_exists(&self, source_id: &str) -> bool {
        self.known_sources.contains(source_id)
    }
}
