//! In-memory reference implementation of [`crate::Store`], used by all tests
//! and suitable as the default for a single-process deployment. A
//! `sqlx::PgPool`-backed implementation following the same trait would sit
//! alongside this module in a production build (spec §6's "Persisted
//! layout"); it is not included here since the default build path carries no
//! live-database requirement (see `SPEC_FULL.md` §1.1).

use crate::{
    AsyncOperationRecord, Etag, FriendlyNameBinding, PortableResourceRecord, Record, Store,
    SystemData,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use ucp_errors::UcpError;

#[derive(Default)]
pub struct InMemoryStore {
    prrs: RwLock<HashMap<String, Record<PortableResourceRecord>>>,
    async_ops: RwLock<HashMap<String, AsyncOperationRecord>>,
    friendly_names: RwLock<HashMap<(String, String), FriendlyNameBinding>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn get_prr(&self, id: &str) -> Result<Option<Record<PortableResourceRecord>>, UcpError> {
        Ok(self.prrs.read().await.get(id).cloned())
    }

    async fn put_prr(
        &self,
        id: &str,
        data: PortableResourceRecord,
        expected_etag: Option<&Etag>,
    ) -> Result<Etag, UcpError> {
        let mut prrs = self.prrs.write().await;
        let now = chrono::Utc::now();

        let record = match (prrs.get(id), expected_etag) {
            (Some(existing), Some(expected)) if &existing.etag == expected => Record {
                data,
                etag: Etag::generate(),
                system_data: SystemData {
                    created_by: existing.system_data.created_by.clone(),
                    created_at: existing.system_data.created_at,
                    last_modified_by: None,
                    last_modified_at: now,
                },
            },
            (Some(_), Some(_)) => {
                return Err(UcpError::Conflict(format!(
                    "etag mismatch updating {id}"
                )))
            }
            (Some(_), None) => {
                return Err(UcpError::Conflict(format!(
                    "{id} already exists but no etag was supplied"
                )))
            }
            (None, Some(_)) => {
                return Err(UcpError::Conflict(format!(
                    "{id} does not exist but an etag was supplied"
                )))
            }
            (None, None) => Record {
                data,
                etag: Etag::generate(),
                system_data: SystemData {
                    created_by: None,
                    created_at: now,
                    last_modified_by: None,
                    last_modified_at: now,
                },
            },
        };

        let etag = record.etag.clone();
        prrs.insert(id.to_string(), record);
        Ok(etag)
    }

    async fn delete_prr(&self, id: &str, expected_etag: Option<&Etag>) -> Result<(), UcpError> {
        let mut prrs = self.prrs.write().await;
        match (prrs.get(id), expected_etag) {
            (None, _) => Ok(()),
            (Some(existing), Some(expected)) if &existing.etag == expected => {
                prrs.remove(id);
                Ok(())
            }
            (Some(_), Some(_)) => Err(UcpError::Conflict(format!("etag mismatch deleting {id}"))),
            (Some(_), None) => {
                prrs.remove(id);
                Ok(())
            }
        }
    }

    async fn get_async_op(&self, op_id: &str) -> Result<Option<AsyncOperationRecord>, UcpError> {
        Ok(self.async_ops.read().await.get(op_id).cloned())
    }

    async fn put_async_op(&self, record: AsyncOperationRecord) -> Result<(), UcpError> {
        self.async_ops
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_friendly_name(
        &self,
        plane_scope: &str,
        name: &str,
    ) -> Result<Option<FriendlyNameBinding>, UcpError> {
        Ok(self
            .friendly_names
            .read()
            .await
            .get(&(plane_scope.to_string(), name.to_string()))
            .cloned())
    }

    async fn put_friendly_name(&self, binding: FriendlyNameBinding) -> Result<(), UcpError> {
        self.friendly_names.write().await.insert(
            (binding.plane_scope.clone(), binding.friendly_name.clone()),
            binding,
        );
        Ok(())
    }

    async fn delete_friendly_name(
        &self,
        plane_scope: &str,
        name: &str,
    ) -> Result<(), UcpError> {
        self.friendly_names
            .write()
            .await
            .remove(&(plane_scope.to_string(), name.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobKind, ProvisioningState, ResourceProvisioning};

    fn sample_prr() -> PortableResourceRecord {
        PortableResourceRecord {
            id: "/planes/radius/local/resourceGroups/rg0/providers/Applications.Datastores/mongoDatabases/mongo0".into(),
            name: "mongo0".into(),
            tenant: "rg0".into(),
            environment: "env0".into(),
            application: None,
            async_provisioning_state: ProvisioningState::Accepted,
            resource_provisioning: ResourceProvisioning::Recipe,
            manual: None,
            recipe: None,
            output_resources: Vec::new(),
            computed_values: Default::default(),
            secret_values: Default::default(),
            recipe_status: None,
        }
    }

    #[tokio::test]
    async fn create_requires_no_etag() {
        let store = InMemoryStore::new();
        let id = "id0";
        let etag = store.put_prr(id, sample_prr(), None).await.unwrap();
        assert!(store.get_prr(id).await.unwrap().is_some());

        // Re-creating without an etag conflicts because the record exists.
        assert!(matches!(
            store.put_prr(id, sample_prr(), None).await,
            Err(UcpError::Conflict(_))
        ));

        // Updating with a stale etag conflicts.
        let stale = Etag("not-the-real-one".into());
        assert!(matches!(
            store.put_prr(id, sample_prr(), Some(&stale)).await,
            Err(UcpError::Conflict(_))
        ));

        // Updating with the correct etag succeeds and changes the etag.
        let next = store.put_prr(id, sample_prr(), Some(&etag)).await.unwrap();
        assert_ne!(next, etag);
    }

    #[tokio::test]
    async fn delete_is_idempotent_when_missing() {
        let store = InMemoryStore::new();
        assert!(store.delete_prr("nope", None).await.is_ok());
    }

    #[tokio::test]
    async fn friendly_name_roundtrip() {
        let store = InMemoryStore::new();
        let binding = FriendlyNameBinding {
            plane_scope: "aws/aws/accounts/123/regions/us-east-2".into(),
            friendly_name: "ks1".into(),
            cloud_control_id: "arn:aws:kinesis:...".into(),
            primary_identifier_values: vec!["ks1".into()],
        };
        store.put_friendly_name(binding.clone()).await.unwrap();
        let got = store
            .get_friendly_name(&binding.plane_scope, "ks1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.cloud_control_id, binding.cloud_control_id);

        store
            .delete_friendly_name(&binding.plane_scope, "ks1")
            .await
            .unwrap();
        assert!(store
            .get_friendly_name(&binding.plane_scope, "ks1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn async_op_record_roundtrip() {
        let store = InMemoryStore::new();
        let now = chrono::Utc::now();
        let record = AsyncOperationRecord {
            id: "op0".into(),
            target_resource_id: "id0".into(),
            kind: JobKind::Put,
            state: ProvisioningState::Provisioning,
            started_at: now,
            last_heartbeat: now,
            retries: 0,
            terminal_error: None,
            request_token: None,
        };
        store.put_async_op(record.clone()).await.unwrap();
        let got = store.get_async_op("op0").await.unwrap().unwrap();
        assert_eq!(got.target_resource_id, "id0");
    }
}
