//! `GET /planes` and `PUT /planes/{type}/{instance}` (spec §6).

use crate::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use planes::Plane;
use std::sync::Arc;

pub async fn list_planes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.planes.list())
}

pub async fn register_plane(
    State(state): State<Arc<AppState>>,
    Path((plane_type, instance)): Path<(String, String)>,
    Json(mut plane): Json<Plane>,
) -> impl IntoResponse {
    plane.plane_type = plane_type;
    plane.instance = instance;
    state.planes.register(plane.clone());
    Json(plane)
}
