//! Hands a portable-resource request off to the async deployment processor
//! (spec §4.3 point 5, §4.5.1): reads are served straight from the store,
//! writes persist the desired record and enqueue a job.

use crate::AppState;
use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use resource_id::ResourceId;
use serde::Deserialize;
use std::sync::Arc;
use store::{
    Etag, JobKind, ManualSpec, PortableResourceRecord, RecipeSpec, ResourceProvisioning,
};
use ucp_errors::{ProvisioningState, UcpError, AZURE_ASYNC_OPERATION_HEADER, LOCATION_HEADER};

/// The subset of a PUT/PATCH body's `properties` this processor understands;
/// everything else (outputResources, computedValues, ...) is server-computed
/// and ignored if the caller sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesiredProperties {
    environment: String,
    #[serde(default)]
    application: Option<String>,
    resource_provisioning: ResourceProvisioning,
    #[serde(default)]
    manual: Option<ManualSpec>,
    #[serde(default)]
    recipe: Option<RecipeSpec>,
}

async fn read_desired(body: Body) -> Result<DesiredProperties, UcpError> {
    let bytes = axum::body::to_bytes(body, 1024 * 1024)
        .await
        .map_err(|err| UcpError::InvalidRequest(format!("failed to read request body: {err}")))?;
    let envelope: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|err| UcpError::InvalidRequest(format!("request body is not valid JSON: {err}")))?;
    let properties = envelope
        .get("properties")
        .cloned()
        .ok_or_else(|| UcpError::InvalidRequest("request body is missing properties".to_string()))?;
    serde_json::from_value(properties)
        .map_err(|err| UcpError::InvalidRequest(format!("invalid portable resource properties: {err}")))
}

fn job_kind_for(method: &Method) -> JobKind {
    match *method {
        Method::PATCH => JobKind::Patch,
        Method::DELETE => JobKind::Delete,
        _ => JobKind::Put,
    }
}

async fn enqueue_and_accept(state: &AppState, id: &ResourceId, kind: JobKind) -> Response {
    let job_id = automations::server::job_id(&id.to_string());
    let initial_state = serde_json::to_value(deploy::DeployJobState {
        resource_id: id.to_string(),
    })
    .unwrap_or_default();
    state.job_queues.for_kind(kind).enqueue(job_id, initial_state).await;

    let now = chrono::Utc::now();
    let record = store::AsyncOperationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        target_resource_id: id.to_string(),
        kind,
        state: ProvisioningState::Accepted,
        started_at: now,
        last_heartbeat: now,
        retries: 0,
        terminal_error: None,
        request_token: None,
    };
    let op_id = record.id.clone();
    if let Err(err) = state.store.put_async_op(record).await {
        return err.into_response();
    }
    tracing::info!(%op_id, resource_id = %id, ?kind, "enqueued portable resource job");

    let status_url = format!(
        "/planes/{}/{}/operationresults/{op_id}",
        id.plane_type(),
        id.plane_instance()
    );
    let mut response = StatusCode::ACCEPTED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        AZURE_ASYNC_OPERATION_HEADER,
        status_url.parse().unwrap_or_else(|_| "/".parse().unwrap()),
    );
    headers.insert(LOCATION_HEADER, id.to_string().parse().unwrap_or_else(|_| "/".parse().unwrap()));
    response
}

pub async fn handle(state: Arc<AppState>, id: ResourceId, method: Method, body: Body) -> Response {
    match method {
        Method::GET => match state.store.get_prr(&id.to_string()).await {
            Ok(Some(record)) => (StatusCode::OK, axum::Json(record.data)).into_response(),
            Ok(None) => StatusCode::NOT_FOUND.into_response(),
            Err(err) => err.into_response(),
        },
        Method::PUT | Method::PATCH => {
            let desired = match read_desired(body).await {
                Ok(d) => d,
                Err(err) => return err.into_response(),
            };

            let existing = match state.store.get_prr(&id.to_string()).await {
                Ok(existing) => existing,
                Err(err) => return err.into_response(),
            };

            let name = id
                .types()
                .last()
                .and_then(|t| t.name.clone())
                .unwrap_or_default();

            let record = PortableResourceRecord {
                id: id.to_string(),
                name,
                tenant: id.plane_instance().to_string(),
                environment: desired.environment,
                application: desired.application,
                async_provisioning_state: ProvisioningState::Accepted,
                resource_provisioning: desired.resource_provisioning,
                manual: desired.manual.or_else(|| {
                    existing.as_ref().and_then(|r| r.data.manual.clone())
                }),
                recipe: desired.recipe,
                output_resources: existing
                    .as_ref()
                    .map(|r| r.data.output_resources.clone())
                    .unwrap_or_default(),
                computed_values: existing
                    .as_ref()
                    .map(|r| r.data.computed_values.clone())
                    .unwrap_or_default(),
                secret_values: existing
                    .as_ref()
                    .map(|r| r.data.secret_values.clone())
                    .unwrap_or_default(),
                recipe_status: existing.as_ref().and_then(|r| r.data.recipe_status.clone()),
            };

            if let Err(err) = deploy::job::validate_prr(&record) {
                return err.into_response();
            }

            let expected_etag: Option<Etag> = existing.map(|r| r.etag);
            if let Err(err) = state
                .store
                .put_prr(&id.to_string(), record, expected_etag.as_ref())
                .await
            {
                return err.into_response();
            }

            enqueue_and_accept(&state, &id, job_kind_for(&method)).await
        }
        Method::DELETE => {
            let existing = match state.store.get_prr(&id.to_string()).await {
                Ok(Some(r)) => r,
                Ok(None) => return StatusCode::NOT_FOUND.into_response(),
                Err(err) => return err.into_response(),
            };
            let mut data = existing.data;
            data.async_provisioning_state = ProvisioningState::Deleting;
            if let Err(err) = state
                .store
                .put_prr(&id.to_string(), data, Some(&existing.etag))
                .await
            {
                return err.into_response();
            }
            enqueue_and_accept(&state, &id, JobKind::Delete).await
        }
        _ => UcpError::InvalidRequest("unsupported method for a portable resource".to_string())
            .into_response(),
    }
}
