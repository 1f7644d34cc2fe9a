//! `GET /…/operationresults/{opId}` (spec §6): synthesizes the ARM status
//! document from a persisted [`store::AsyncOperationRecord`].

use ucp_errors::{AsyncOperationStatus, UcpError};

pub async fn load_status(
    store: &dyn store::Store,
    op_id: &str,
) -> Result<AsyncOperationStatus, UcpError> {
    let record = store
        .get_async_op(op_id)
        .await?
        .ok_or_else(|| UcpError::NotFound(format!("async operation {op_id} not found")))?;

    let error = record.terminal_error.map(|message| ucp_errors::ErrorDetail {
        code: "UpstreamRejected".to_string(),
        message,
        target: Some(record.target_resource_id.clone()),
        details: Vec::new(),
    });

    Ok(AsyncOperationStatus {
        status: record.state.into(),
        start_time: record.started_at,
        end_time: record.state.is_terminal().then_some(record.last_heartbeat),
        error,
    })
}
