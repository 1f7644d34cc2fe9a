//! The persisted layout (spec §3, §6): portable resource records, async
//! operation records, and AWS friendly-name bindings, all keyed by resource
//! URI and mutated only through compare-and-swap on an opaque `etag`
//! (spec §5: "the store ... is the only shared mutable state").

pub mod memory;

use serde::{Deserialize, Serialize};
pub use ucp_errors::ProvisioningState;
use ucp_errors::UcpError;
use uuid::Uuid;

/// An opaque, server-generated concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etag(pub String);

impl Etag {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemData {
    pub created_by: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_modified_by: Option<String>,
    pub last_modified_at: chrono::DateTime<chrono::Utc>,
}

/// The generic persisted-record envelope described in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record<T> {
    pub data: T,
    pub etag: Etag,
    pub system_data: SystemData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceProvisioning {
    Manual,
    Recipe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    pub version: String,
    pub metadata: serde_json::Value,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSpec {
    pub name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStatus {
    pub template_kind: String,
    pub template_path: String,
    pub template_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub kind: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResource {
    pub local_id: String,
    pub resource_type: ResourceType,
    pub identity: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub radius_managed: Option<bool>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretValueReference {
    pub local_id: String,
    pub value_selector: String,
    pub action: Option<String>,
    pub transformer_type: Option<String>,
}

/// The persisted state of a portable resource (spec §3 "Portable resource record").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableResourceRecord {
    pub id: String,
    pub name: String,
    pub tenant: String,
    pub environment: String,
    pub application: Option<String>,
    pub async_provisioning_state: ProvisioningState,
    pub resource_provisioning: ResourceProvisioning,
    pub manual: Option<ManualSpec>,
    pub recipe: Option<RecipeSpec>,
    #[serde(default)]
    pub output_resources: Vec<OutputResource>,
    #[serde(default)]
    pub computed_values: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub secret_values: std::collections::BTreeMap<String, SecretValueReference>,
    pub recipe_status: Option<RecipeStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Put,
    Patch,
    Delete,
}

/// `(id, targetResourceID, kind, state, startedAt, lastHeartbeat, retries, terminalError?, requestToken?)`.
///
/// `request_token` is only ever set for an AWS-plane operation: it is the
/// adapter's handle to the underlying Cloud Control request, which the
/// status endpoint polls to advance `state` past `Accepted`. Portable
/// resource jobs (C5) leave it `None` and advance `state` themselves as they
/// progress through the deployment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncOperationRecord {
    pub id: String,
    pub target_resource_id: String,
    pub kind: JobKind,
    pub state: ProvisioningState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub retries: u32,
    pub terminal_error: Option<String>,
    #[serde(default)]
    pub request_token: Option<String>,
}

/// `(planeScope, userFriendlyName) -> {cloudControlID, primaryIdentifierValues[]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendlyNameBinding {
    pub plane_scope: String,
    pub friendly_name: String,
    pub cloud_control_id: String,
    pub primary_identifier_values: Vec<String>,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_prr(&self, id: &str) -> Result<Option<Record<PortableResourceRecord>>, UcpError>;

    /// Inserts or updates a PRR. `expected_etag` of `None` means "must not
    /// already exist". Returns the new etag, or `Conflict` on mismatch.
    async fn put_prr(
        &self,
        id: &str,
        data: PortableResourceRecord,
        expected_etag: Option<&Etag>,
    ) -> Result<Etag, UcpError>;

    async fn delete_prr(&self, id: &str, expected_etag: Option<&Etag>) -> Result<(), UcpError>;

    async fn get_async_op(&self, op_id: &str) -> Result<Option<AsyncOperationRecord>, UcpError>;

    async fn put_async_op(&self, record: AsyncOperationRecord) -> Result<(), UcpError>;

    async fn get_friendly_name(
        &self,
        plane_scope: &str,
        name: &str,
    ) -> Result<Option<FriendlyNameBinding>, UcpError>;

    async fn put_friendly_name(&self, binding: FriendlyNameBinding) -> Result<(), UcpError>;

    async fn delete_friendly_name(&self, plane_scope: &str, name: &str)
        -> Result<(), UcpError>;
}
