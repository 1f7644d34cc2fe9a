//! End-to-end coverage for the native-plane reverse proxy path (spec §4.3
//! point 3, scenario S1): a request to a plane registered with
//! `PlaneKind::Native` is forwarded to the upstream resource provider
//! verbatim and its response streamed back untouched.

use async_trait::async_trait;
use aws_adapter::client::{CloudControlClient, ProgressEvent};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use indexmap::IndexMap;
use planes::{Plane, PlaneConfig, PlaneKind, PlaneRegistry};
use router::portable_types::PortableTypeRegistry;
use router::{AppState, JobQueues};
use std::sync::Arc;
use tower::ServiceExt;
use ucp_errors::UcpError;

struct UnusedCloudControl;

#[async_trait]
impl CloudControlClient for UnusedCloudControl {
    async fn get_resource(&self, _: &str, _: &str) -> Result<Option<serde_json::Value>, UcpError> {
        unreachable!("native pass-through never touches the aws adapter")
    }
    async fn create_resource(&self, _: &str, _: &serde_json::Value) -> Result<ProgressEvent, UcpError> {
        unreachable!("native pass-through never touches the aws adapter")
    }
    async fn update_resource(
        &self,
        _: &str,
        _: &str,
        _: &json_patch::Patch,
    ) -> Result<ProgressEvent, UcpError> {
        unreachable!("native pass-through never touches the aws adapter")
    }
    async fn delete_resource(&self, _: &str, _: &str) -> Result<ProgressEvent, UcpError> {
        unreachable!("native pass-through never touches the aws adapter")
    }
    async fn get_resource_request_status(&self, _: &str) -> Result<ProgressEvent, UcpError> {
        unreachable!("native pass-through never touches the aws adapter")
    }
}

async fn spawn_upstream() -> url::Url {
    let upstream = axum::Router::new().route(
        "/resourceGroups/rg0/providers/Applications.Core/environments/env0",
        axum::routing::get(|| async {
            (StatusCode::OK, axum::Json(serde_json::json!({"name": "env0"})))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    url::Url::parse(&format!("http://{addr}")).unwrap()
}

fn build_state(upstream: url::Url) -> Arc<AppState> {
    let registry = PlaneRegistry::from_config(PlaneConfig {
        planes: vec![Plane {
            plane_type: "radius".into(),
            instance: "local".into(),
            kind: PlaneKind::Native,
            routes: IndexMap::from([("Applications.Core".to_string(), upstream)]),
            credentials_ref: None,
        }],
    });

    Arc::new(AppState {
        planes: Arc::new(registry),
        store: Arc::new(store::memory::InMemoryStore::new()),
        http_client: reqwest::Client::new(),
        cloud_control: Arc::new(UnusedCloudControl),
        aws_schemas: Arc::new(aws_adapter::schema::TypeSchemaRegistry::new()),
        portable_types: Arc::new(PortableTypeRegistry::new()),
        job_queues: Arc::new(JobQueues {
            put: Arc::new(automations::queue::MemoryQueue::new()),
            patch: Arc::new(automations::queue::MemoryQueue::new()),
            delete: Arc::new(automations::queue::MemoryQueue::new()),
        }),
        aws_status_queue: Arc::new(automations::queue::MemoryQueue::new()),
    })
}

#[tokio::test]
async fn native_plane_request_is_forwarded_to_upstream() {
    let upstream = spawn_upstream().await;
    let state = build_state(upstream);
    let app = router::build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/planes/radius/local/resourceGroups/rg0/providers/Applications.Core/environments/env0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["name"], "env0");
}

#[tokio::test]
async fn unregistered_provider_namespace_is_an_invalid_configuration() {
    let upstream = spawn_upstream().await;
    let state = build_state(upstream);
    let app = router::build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/planes/radius/local/resourceGroups/rg0/providers/Other.Namespace/things/t0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
