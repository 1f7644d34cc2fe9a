//! The front-door router (C3) and its ambient wiring: application state,
//! job-queue selection, and the axum route table (spec §4.3, §6).

pub mod aws_handoff;
pub mod dispatch;
pub mod planes_admin;
pub mod portable;
pub mod portable_types;
pub mod proxy;
pub mod status;

use automations::queue::JobQueue;
use axum::routing::{any, get, put};
use axum::Router;
use portable_types::PortableTypeRegistry;
use std::sync::Arc;
use store::JobKind;
use tower_http::trace::TraceLayer;

/// One job queue per portable-resource verb, matching the per-verb
/// controller registration in spec §4.5.1 — each verb gets its own
/// `automations::Server` instance in the `ucp` binary, so a PUT job can
/// never be dequeued by the DELETE executor's loop.
pub struct JobQueues {
    pub put: Arc<dyn JobQueue>,
    pub patch: Arc<dyn JobQueue>,
    pub delete: Arc<dyn JobQueue>,
}

impl JobQueues {
    pub fn for_kind(&self, kind: JobKind) -> &Arc<dyn JobQueue> {
        match kind {
            JobKind::Put => &self.put,
            JobKind::Patch => &self.patch,
            JobKind::Delete => &self.delete,
        }
    }
}

pub struct AppState {
    pub planes: Arc<planes::PlaneRegistry>,
    pub store: Arc<dyn store::Store>,
    pub http_client: reqwest::Client,
    pub cloud_control: Arc<dyn aws_adapter::client::CloudControlClient>,
    pub aws_schemas: Arc<aws_adapter::schema::TypeSchemaRegistry>,
    pub portable_types: Arc<PortableTypeRegistry>,
    pub job_queues: Arc<JobQueues>,
    /// Jobs that advance an AWS async-operation record from `Accepted` to a
    /// terminal state by polling Cloud Control (see `aws_adapter::status`).
    pub aws_status_queue: Arc<dyn JobQueue>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/planes", get(planes_admin::list_planes))
        .route("/planes/{plane_type}/{instance}", put(planes_admin::register_plane))
        .route("/planes/{*rest}", any(dispatch::dispatch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
