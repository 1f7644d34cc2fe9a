//! Synthesizes the ARM async-operation status document (spec §6) from a
//! Cloud Control `ProgressEvent`, and advances a persisted async-operation
//! record by polling Cloud Control (spec §4.4).

use crate::client::{CloudControlClient, OperationStatus};
use automations::{Executor, JobId, PollOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::Store;
use tokio_util::sync::CancellationToken;
use ucp_errors::{
    backoff::Backoff, AsyncOperationStatus, AsyncOperationStatusCode, ErrorDetail, ProvisioningState,
    UcpError,
};

/// One Cloud Control status check, with no retry or backoff of its own.
/// `Ok(None)` means the operation is still in progress.
async fn check_once(
    client: &dyn CloudControlClient,
    request_token: &str,
    started_at: chrono::DateTime<chrono::Utc>,
) -> Result<Option<AsyncOperationStatus>, UcpError> {
    let event = client.get_resource_request_status(request_token).await?;
    Ok(match event.operation_status {
        OperationStatus::Success => Some(AsyncOperationStatus {
            status: AsyncOperationStatusCode::Succeeded,
            start_time: started_at,
            end_time: Some(chrono::Utc::now()),
            error: None,
        }),
        OperationStatus::Failed => Some(AsyncOperationStatus {
            status: AsyncOperationStatusCode::Failed,
            start_time: started_at,
            end_time: Some(chrono::Utc::now()),
            error: Some(ErrorDetail {
                code: event.error_code.unwrap_or_else(|| "UpstreamRejected".to_string()),
                message: event.status_message.unwrap_or_else(|| "operation failed".to_string()),
                target: None,
                details: Vec::new(),
            }),
        }),
        OperationStatus::CancelComplete => Some(AsyncOperationStatus {
            status: AsyncOperationStatusCode::Canceled,
            start_time: started_at,
            end_time: Some(chrono::Utc::now()),
            error: None,
        }),
        OperationStatus::InProgress => None,
    })
}

/// Polls `client` until the operation reaches a terminal state or
/// `max_attempts` is exceeded, sleeping `backoff`'s jittered delay between
/// attempts. Suited to callers that can afford to block (tests, a one-shot
/// CLI); the production path is [`StatusExecutor`], which is driven by the
/// shared `automations::Server` poll loop instead of blocking in place.
pub async fn poll_until_terminal(
    client: &dyn CloudControlClient,
    request_token: &str,
    mut backoff: Backoff,
    max_attempts: u32,
) -> Result<AsyncOperationStatus, UcpError> {
    let started_at = chrono::Utc::now();
    loop {
        if let Some(status) = check_once(client, request_token, started_at).await? {
            return Ok(status);
        }
        if backoff.attempt() >= max_attempts {
            return Err(UcpError::Timeout(format!(
                "Cloud Control request {request_token} did not reach a terminal state after {max_attempts} attempts"
            )));
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatusJobState {
    pub op_id: String,
}

/// Advances a persisted [`store::AsyncOperationRecord`] created for an AWS
/// request by polling Cloud Control once per tick, so that `GET
/// .../operationresults/{opId}` (spec §6) serves an up-to-date status
/// instead of the `Accepted` state it was created with. One job per AWS
/// operation, enqueued at the same time the record is persisted.
pub struct StatusExecutor<S: Store> {
    pub client: Arc<dyn CloudControlClient>,
    pub store: Arc<S>,
}

#[async_trait::async_trait]
impl<S: Store + 'static> Executor for StatusExecutor<S> {
    type State = StatusJobState;

    async fn poll(
        &self,
        job_id: &JobId,
        state: &mut Self::State,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<PollOutcome> {
        if state.op_id.is_empty() {
            state.op_id = job_id.clone();
        }

        let Some(mut record) = self.store.get_async_op(&state.op_id).await? else {
            return Ok(PollOutcome::Done);
        };
        let Some(token) = record.request_token.clone() else {
            return Ok(PollOutcome::Done);
        };
        if record.state.is_terminal() {
            return Ok(PollOutcome::Done);
        }

        match check_once(self.client.as_ref(), &token, record.started_at).await? {
            Some(status) => {
                record.state = match status.status {
                    AsyncOperationStatusCode::Succeeded => ProvisioningState::Succeeded,
                    AsyncOperationStatusCode::Failed => ProvisioningState::Failed,
                    AsyncOperationStatusCode::Canceled => ProvisioningState::Canceled,
                    AsyncOperationStatusCode::InProgress => record.state,
                };
                record.terminal_error = status.error.map(|e| e.message);
                record.last_heartbeat = chrono::Utc::now();
                self.store.put_async_op(record).await?;
                Ok(PollOutcome::Done)
            }
            None => {
                record.last_heartbeat = chrono::Utc::now();
                self.store.put_async_op(record).await?;
                Ok(PollOutcome::Sleep(std::time::Duration::from_secs(2)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CloudControlClient, ProgressEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedClient {
        responses: Vec<OperationStatus>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CloudControlClient for ScriptedClient {
        async fn get_resource(&self, _: &str, _: &str) -> Result<Option<serde_json::Value>, UcpError> {
            unreachable!()
        }
        async fn create_resource(&self, _: &str, _: &serde_json::Value) -> Result<ProgressEvent, UcpError> {
            unreachable!()
        }
        async fn update_resource(
            &self,
            _: &str,
            _: &str,
            _: &json_patch::Patch,
        ) -> Result<ProgressEvent, UcpError> {
            unreachable!()
        }
        async fn delete_resource(&self, _: &str, _: &str) -> Result<ProgressEvent, UcpError> {
            unreachable!()
        }
        async fn get_resource_request_status(&self, request_token: &str) -> Result<ProgressEvent, UcpError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.responses[idx.min(self.responses.len() - 1)];
            Ok(ProgressEvent {
                request_token: request_token.to_string(),
                operation_status: status,
                resource_model: None,
                error_code: None,
                status_message: Some("done".into()),
            })
        }
    }

    #[tokio::test]
    async fn polls_until_success() {
        let client = ScriptedClient {
            responses: vec![
                OperationStatus::InProgress,
                OperationStatus::InProgress,
                OperationStatus::Success,
            ],
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let backoff = Backoff::new(std::time::Duration::from_millis(1), std::time::Duration::from_millis(5));
        let status = poll_until_terminal(&client, "tok", backoff, 10).await.unwrap();
        assert_eq!(status.status, AsyncOperationStatusCode::Succeeded);
    }

    #[tokio::test]
    async fn failed_operation_carries_error_detail() {
        let client = ScriptedClient {
            responses: vec![OperationStatus::Failed],
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let backoff = Backoff::new(std::time::Duration::from_millis(1), std::time::Duration::from_millis(5));
        let status = poll_until_terminal(&client, "tok", backoff, 10).await.unwrap();
        assert_eq!(status.status, AsyncOperationStatusCode::Failed);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn status_executor_sleeps_while_in_progress_then_completes() {
        use store::{AsyncOperationRecord, JobKind};

        let store = Arc::new(store::memory::InMemoryStore::new());
        let now = chrono::Utc::now();
        store
            .put_async_op(AsyncOperationRecord {
                id: "op0".into(),
                target_resource_id: "res0".into(),
                kind: JobKind::Put,
                state: ProvisioningState::Accepted,
                started_at: now,
                last_heartbeat: now,
                retries: 0,
                terminal_error: None,
                request_token: Some("tok".into()),
            })
            .await
            .unwrap();

        let client = ScriptedClient {
            responses: vec![OperationStatus::InProgress, OperationStatus::Success],
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let executor = StatusExecutor {
            client: Arc::new(client),
            store: store.clone(),
        };

        let cancel = CancellationToken::new();
        let mut state = StatusJobState { op_id: "op0".into() };

        let first = executor.poll(&"op0".to_string(), &mut state, &cancel).await.unwrap();
        assert!(matches!(first, PollOutcome::Sleep(_)));
        assert_eq!(
            store.get_async_op("op0").await.unwrap().unwrap().state,
            ProvisioningState::Accepted
        );

        let second = executor.poll(&"op0".to_string(), &mut state, &cancel).await.unwrap();
        assert!(matches!(second, PollOutcome::Done));
        assert_eq!(
            store.get_async_op("op0").await.unwrap().unwrap().state,
            ProvisioningState::Succeeded
        );
    }
}
