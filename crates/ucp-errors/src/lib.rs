//! The ARM error taxonomy (spec §7) and its wire envelope (spec §6).
//!
//! `UcpError` is the fundamental error type threaded through C3/C4/C5. It
//! distinguishes transient (`is_retryable`) from permanent kinds so that
//! callers can apply [`backoff`] uniformly rather than re-deriving
//! retryability at each call site.

pub mod backoff;

use axum::response::IntoResponse;
use serde::Serialize;

/// Header carrying the async-operation status URL, per ARM convention.
pub const AZURE_ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
/// Header carrying the canonical resource URL, per ARM convention.
pub const LOCATION_HEADER: &str = "Location";

#[derive(Debug, thiserror::Error)]
pub enum UcpError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl UcpError {
    /// ARM-style error code for the wire envelope.
    pub fn code(&self) -> &'static str {
        match self {
            UcpError::InvalidRequest(_) => "InvalidRequest",
            UcpError::NotFound(_) => "NotFound",
            UcpError::Conflict(_) => "Conflict",
            UcpError::InvalidConfiguration(_) => "InvalidConfiguration",
            UcpError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            UcpError::UpstreamRejected(_) => "UpstreamRejected",
            UcpError::Timeout(_) => "Timeout",
            UcpError::InternalServerError(_) => "InternalServerError",
        }
    }

    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            UcpError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            UcpError::NotFound(_) => StatusCode::NOT_FOUND,
            UcpError::Conflict(_) => StatusCode::CONFLICT,
            UcpError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            UcpError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            UcpError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
            UcpError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            UcpError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient kinds are eligible for bounded retry in-place (§7); all
    /// others terminate the async job immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UcpError::UpstreamUnavailable(_))
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// The ARM JSON error envelope: `{error: {code, message, target?, details?[]}}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    pub fn new(err: &UcpError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.message(),
                target: None,
                details: Vec::new(),
            },
        }
    }

    /// Builds an envelope aggregating several violations under one code, for
    /// validation errors that report more than one problem at once (spec §8 S5).
    pub fn with_details(code: &str, message: &str, details: Vec<ErrorDetail>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
                target: None,
                details,
            },
        }
    }
}

impl IntoResponse for UcpError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, UcpError::InternalServerError(_)) {
            tracing::error!(error = %self, "responding with internal error");
        }
        let status = self.http_status();
        let body = axum::Json(ErrorEnvelope::new(&self));
        (status, body).into_response()
    }
}

/// The provisioning state of a portable resource record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ProvisioningState {
    Accepted,
    Provisioning,
    Updating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
}

impl ProvisioningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }
}

/// The coarser status code ARM async-operation documents report (spec §6,
/// §4.4): `{"InProgress","Succeeded","Failed","Canceled"}`, unlike
/// [`ProvisioningState`]'s finer-grained `Accepted`/`Provisioning`/
/// `Updating`/`Deleting` non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum AsyncOperationStatusCode {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl From<ProvisioningState> for AsyncOperationStatusCode {
    fn from(state: ProvisioningState) -> Self {
        match state {
            ProvisioningState::Succeeded => AsyncOperationStatusCode::Succeeded,
            ProvisioningState::Failed => AsyncOperationStatusCode::Failed,
            ProvisioningState::Canceled => AsyncOperationStatusCode::Canceled,
            ProvisioningState::Accepted
            | ProvisioningState::Provisioning
            | ProvisioningState::Updating
            | ProvisioningState::Deleting => AsyncOperationStatusCode::InProgress,
        }
    }
}

/// The ARM async-operation status document (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationStatus {
    pub status: AsyncOperationStatusCode,
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}
