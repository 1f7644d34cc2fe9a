//! The Cloud Control API boundary, behind a trait so tests substitute a
//! fake (spec §4.4). The production implementation wraps
//! `aws-sdk-cloudcontrol`'s `get_resource`/`create_resource`/
//! `update_resource`/`delete_resource`/`get_resource_request_status` calls.

use async_trait::async_trait;
use ucp_errors::UcpError;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub request_token: String,
    pub operation_status: OperationStatus,
    pub resource_model: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub status_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
    CancelComplete,
}

#[async_trait]
pub trait CloudControlClient: Send + Sync {
    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<Option<serde_json::Value>, UcpError>;

    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &serde_json::Value,
    ) -> Result<ProgressEvent, UcpError>;

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch: &json_patch::Patch,
    ) -> Result<ProgressEvent, UcpError>;

    async fn delete_resource(&self, type_name: &str, identifier: &str) -> Result<ProgressEvent, UcpError>;

    async fn get_resource_request_status(&self, request_token: &str) -> Result<ProgressEvent, UcpError>;
}

/// Wraps a live `aws_sdk_cloudcontrol::Client`. Call translation follows the
/// same "convert AWS SDK types to provider-agnostic shapes at the boundary"
/// pattern the corpus uses for its own cloud SDK wrappers.
pub struct SdkCloudControlClient {
    client: aws_sdk_cloudcontrol::Client,
}

impl SdkCloudControlClient {
    pub fn new(client: aws_sdk_cloudcontrol::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CloudControlClient for SdkCloudControlClient {
    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<Option<serde_json::Value>, UcpError> {
        let result = self
            .client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(output) => {
                let body = output
                    .resource_description()
                    .and_then(|r| r.properties())
                    .map(|raw| serde_json::from_str(raw))
                    .transpose()
                    .map_err(|e| {
                        UcpError::UpstreamRejected(format!("Cloud Control returned malformed JSON: {e}"))
                    })?;
                Ok(body)
            }
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("ResourceNotFoundException") {
                    Ok(None)
                } else {
                    Err(classify_sdk_error(&msg))
                }
            }
        }
    }

    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &serde_json::Value,
    ) -> Result<ProgressEvent, UcpError> {
        let desired_state_json = serde_json::to_string(desired_state)
            .map_err(|e| UcpError::InternalServerError(format!("failed to serialize desired state: {e}")))?;
        let result = self
            .client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state_json)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e.to_string()))?;

        Ok(ProgressEvent {
            request_token: result
                .progress_event()
                .and_then(|p| p.request_token())
                .unwrap_or_default()
                .to_string(),
            operation_status: OperationStatus::InProgress,
            resource_model: None,
            error_code: None,
            status_message: None,
        })
    }

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch: &json_patch::Patch,
    ) -> Result<ProgressEvent, UcpError> {
        let patch_document = serde_json::to_string(patch)
            .map_err(|e| UcpError::InternalServerError(format!("failed to serialize patch: {e}")))?;
        let result = self
            .client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e.to_string()))?;

        Ok(ProgressEvent {
            request_token: result
                .progress_event()
                .and_then(|p| p.request_token())
                .unwrap_or_default()
                .to_string(),
            operation_status: OperationStatus::InProgress,
            resource_model: None,
            error_code: None,
            status_message: None,
        })
    }

    async fn delete_resource(&self, type_name: &str, identifier: &str) -> Result<ProgressEvent, UcpError> {
        let result = self
            .client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e.to_string()))?;

        Ok(ProgressEvent {
            request_token: result
                .progress_event()
                .and_then(|p| p.request_token())
                .unwrap_or_default()
                .to_string(),
            operation_status: OperationStatus::InProgress,
            resource_model: None,
            error_code: None,
            status_message: None,
        })
    }

    async fn get_resource_request_status(&self, request_token: &str) -> Result<ProgressEvent, UcpError> {
        let result = self
            .client
            .get_resource_request_status()
            .request_token(request_token)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e.to_string()))?;

        let event = result.progress_event();
        let status = match event.and_then(|e| e.operation_status()) {
            Some(aws_sdk_cloudcontrol::types::OperationStatus::Success) => OperationStatus::Success,
            Some(aws_sdk_cloudcontrol::types::OperationStatus::Failed) => OperationStatus::Failed,
            Some(aws_sdk_cloudcontrol::types::OperationStatus::CancelComplete) => {
                OperationStatus::CancelComplete
            }
            _ => OperationStatus::InProgress,
        };

        Ok(ProgressEvent {
            request_token: request_token.to_string(),
            operation_status: status,
            resource_model: event
                .and_then(|e| e.resource_model())
                .and_then(|raw| serde_json::from_str(raw).ok()),
            error_code: event
                .and_then(|e| e.error_code())
                .map(|c| c.as_str().to_string()),
            status_message: event.and_then(|e| e.status_message()).map(str::to_string),
        })
    }
}

fn classify_sdk_error(message: &str) -> UcpError {
    if message.contains("Throttling") || message.contains("ServiceInternalError") {
        UcpError::UpstreamUnavailable(message.to_string())
    } else if message.contains("AlreadyExists") {
        UcpError::Conflict(message.to_string())
    } else if message.contains("ResourceNotFoundException") {
        UcpError::NotFound(message.to_string())
    } else {
        UcpError::UpstreamRejected(message.to_string())
    }
}
