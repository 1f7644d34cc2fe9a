//! Hands a parsed AWS-plane request off to the Cloud Control adapter (C4)
//! and synthesizes the ARM status headers (spec §4.4).

use crate::AppState;
use aws_adapter::{handle_delete, handle_get, handle_put, PutOutcome, PutRequest};
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use resource_id::ResourceId;
use std::sync::Arc;
use ucp_errors::{UcpError, AZURE_ASYNC_OPERATION_HEADER, LOCATION_HEADER};
use uuid::Uuid;

async fn read_properties(body: Body) -> Result<serde_json::Map<String, serde_json::Value>, UcpError> {
    let bytes = axum::body::to_bytes(body, 1024 * 1024)
        .await
        .map_err(|err| UcpError::InvalidRequest(format!("failed to read request body: {err}")))?;
    if bytes.is_empty() {
        return Ok(serde_json::Map::new());
    }
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|err| UcpError::InvalidRequest(format!("request body is not valid JSON: {err}")))?;
    Ok(value
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default())
}

async fn accepted_response(
    state: &AppState,
    id: &ResourceId,
    kind: store::JobKind,
    request_token: Option<String>,
) -> Response {
    let op_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    let record = store::AsyncOperationRecord {
        id: op_id.clone(),
        target_resource_id: id.to_string(),
        kind,
        state: ucp_errors::ProvisioningState::Accepted,
        started_at: now,
        last_heartbeat: now,
        retries: 0,
        terminal_error: None,
        request_token: request_token.clone(),
    };
    if let Err(err) = state.store.put_async_op(record).await {
        return err.into_response();
    }
    tracing::info!(%op_id, resource_id = %id, ?kind, request_token = request_token.as_deref().unwrap_or(""), "accepted aws adapter request");

    if request_token.is_some() {
        let job_state = serde_json::to_value(aws_adapter::status::StatusJobState { op_id: op_id.clone() })
            .unwrap_or_default();
        state
            .aws_status_queue
            .enqueue(automations::server::job_id(&op_id), job_state)
            .await;
    }

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

pub async fn handle(
    state: Arc<AppState>,
    id: ResourceId,
    method: Method,
    virtual_verb: Option<&str>,
    _headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(type_name) = crate::dispatch::aws_cloud_control_type_name(&id) else {
        return UcpError::InvalidRequest("AWS resource id is missing a type segment".to_string()).into_response();
    };
    let plane_scope = id.truncate(0).to_string();
    let name_suffix = id.types().first().and_then(|t| t.name.as_deref());

    match virtual_verb {
        Some("put") => {
            let properties = match read_properties(body).await {
                Ok(p) => p,
                Err(err) => return err.into_response(),
            };
            let outcome = handle_put(
                state.cloud_control.as_ref(),
                state.store.as_ref(),
                &state.aws_schemas,
                PutRequest {
                    plane_scope: &plane_scope,
                    type_name: &type_name,
                    name_suffix,
                    desired_properties: properties,
                },
            )
            .await;
            match outcome {
                Ok(PutOutcome::Accepted { request_token }) => {
                    accepted_response(&state, &id, store::JobKind::Put, Some(request_token)).await
                }
                Ok(PutOutcome::NoOp { current }) => (StatusCode::OK, axum::Json(current)).into_response(),
                Err(err) => err.into_response(),
            }
        }
        Some("get") => {
            let Some(name_suffix) = name_suffix else {
                return UcpError::InvalidRequest("the :get virtual verb requires a name in the URL".to_string())
                    .into_response();
            };
            match handle_get(
                state.cloud_control.as_ref(),
                state.store.as_ref(),
                &state.aws_schemas,
                &plane_scope,
                &type_name,
                name_suffix,
            )
            .await
            {
                Ok(Some(body)) => (StatusCode::OK, axum::Json(body)).into_response(),
                Ok(None) => StatusCode::NOT_FOUND.into_response(),
                Err(err) => err.into_response(),
            }
        }
        Some("delete") => delete(&state, &id, &plane_scope, &type_name, name_suffix).await,
        Some(other) => {
            UcpError::InvalidRequest(format!("unsupported virtual verb :{other}")).into_response()
        }
        None => match method {
            Method::GET => {
                let Some(name_suffix) = name_suffix else {
                    return UcpError::InvalidRequest("reading an AWS resource requires a name in the URL".to_string())
                        .into_response();
                };
                match handle_get(
                    state.cloud_control.as_ref(),
                    state.store.as_ref(),
                    &state.aws_schemas,
                    &plane_scope,
                    &type_name,
                    name_suffix,
                )
                .await
                {
                    Ok(Some(body)) => (StatusCode::OK, axum::Json(body)).into_response(),
                    Ok(None) => StatusCode::NOT_FOUND.into_response(),
                    Err(err) => err.into_response(),
                }
            }
            Method::DELETE => delete(&state, &id, &plane_scope, &type_name, name_suffix).await,
            _ => UcpError::InvalidRequest(
                "mutations on the aws plane require the :put virtual verb".to_string(),
            )
            .into_response(),
        },
    }
}

async fn delete(
    state: &AppState,
    id: &ResourceId,
    plane_scope: &str,
    type_name: &str,
    name_suffix: Option<&str>,
) -> Response {
    let Some(name_suffix) = name_suffix else {
        return UcpError::InvalidRequest("deleting an AWS resource requires a name in the URL".to_string())
            .into_response();
    };
    match handle_delete(
        state.cloud_control.as_ref(),
        state.store.as_ref(),
        &state.aws_schemas,
        plane_scope,
        type_name,
        name_suffix,
    )
    .await
    {
        Ok(request_token) => accepted_response(state, id, store::JobKind::Delete, request_token).await,
        Err(err) => err.into_response(),
    }
}
