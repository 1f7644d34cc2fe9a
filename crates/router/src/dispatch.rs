//! The front-door dispatch table (spec §4.3): parse the ID, find the plane,
//! and route to a native reverse proxy, the AWS adapter, or the portable
//! resource processor.

use crate::AppState;
use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use planes::{PlaneError, PlaneKind};
use resource_id::ResourceId;
use std::sync::Arc;
use ucp_errors::UcpError;

/// If the trailing path segment is a virtual verb (`:get`, `:put`, `:delete`),
/// returns the verb name and the path with that segment stripped.
fn split_virtual_verb(path: &str) -> (&str, Option<&str>) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((head, tail)) if tail.starts_with(':') => (head, Some(&tail[1..])),
        _ => (trimmed, None),
    }
}

/// If the trailing two path segments are `operationresults/<opId>`, returns
/// the opId (spec §6 async status endpoint).
fn split_operation_result(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let (head, op_id) = trimmed.rsplit_once('/')?;
    let (_, last_kind) = head.rsplit_once('/')?;
    if last_kind.eq_ignore_ascii_case("operationresults") {
        Some(op_id)
    } else {
        None
    }
}

/// AWS Cloud Control type names are `::`-joined (`AWS::Kinesis::Stream`);
/// UCP URIs split the provider namespace and the type into separate segments
/// (`providers/AWS.Kinesis/Stream/...`).
pub(crate) fn aws_cloud_control_type_name(id: &ResourceId) -> Option<String> {
    let namespace = id.provider_namespace()?;
    let type_name = id.types().first()?.type_name.as_str();
    Some(format!("{}::{}", namespace.replace('.', "::"), type_name))
}

pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = uri.path();

    if let Some(op_id) = split_operation_result(path) {
        return match crate::status::load_status(state.store.as_ref(), op_id).await {
            Ok(status) => axum::Json(status).into_response(),
            Err(err) => err.into_response(),
        };
    }

    let (id_path, virtual_verb) = split_virtual_verb(path);

    let id = match ResourceId::parse_resource(id_path) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(%err, path = %id_path, "rejecting malformed resource id");
            return UcpError::InvalidRequest(format!("malformed resource id: {err}")).into_response();
        }
    };

    tracing::debug!(%method, resource_id = %id, "dispatching request");

    if virtual_verb.is_some() && !id.plane_type().eq_ignore_ascii_case("aws") {
        return UcpError::InvalidRequest(
            "POST virtual verbs (:get, :put, :delete) are only supported on the aws plane".to_string(),
        )
        .into_response();
    }

    if id.plane_type().eq_ignore_ascii_case("aws") {
        return crate::aws_handoff::handle(state, id, method, virtual_verb, headers, body).await;
    }

    if id.plane_type().eq_ignore_ascii_case("radius")
        && state.portable_types.is_portable(id.provider_namespace().unwrap_or(""), &id.types()[0].type_name)
    {
        return crate::portable::handle(state, id, method, body).await;
    }

    let (upstream, kind) = match state.planes.resolve_upstream(&id) {
        Ok(r) => r,
        Err(err) => return UcpError::from(err).into_response(),
    };

    if !matches!(kind, PlaneKind::Native) {
        return UcpError::from(PlaneError::PlaneUnsupported(
            id.plane_type().to_string(),
            id.plane_instance().to_string(),
            "native reverse proxying".to_string(),
        ))
        .into_response();
    }

    let plane_prefix = format!("/planes/{}/{}", id.plane_type(), id.plane_instance());
    let rewritten_path = id_path.strip_prefix(&plane_prefix).unwrap_or(id_path);
    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let upstream_path = format!("{rewritten_path}{query}");
    crate::proxy::reverse_proxy(&state.http_client, &upstream, &upstream_path, method, headers, body).await
        .into_response()
}
