//! Native-plane reverse proxy (spec §4.3 point 3): rewrites the path onto
//! the upstream base URL, forwards the body and headers verbatim, and
//! streams the response back without touching it. No body translation.

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

pub async fn reverse_proxy(
    client: &reqwest::Client,
    upstream_base: &Url,
    path_and_query: &str,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let target = match upstream_base.join(path_and_query.trim_start_matches('/')) {
        Ok(url) => url,
        Err(err) => {
            return (
                StatusCode::BAD_GATEWAY,
                format!("failed to build upstream URL: {err}"),
            )
                .into_response();
        }
    };

    let method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let mut request = client.request(method, target);
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        request = request.header(name, value);
    }

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("failed to read request body: {err}"))
                .into_response();
        }
    };
    request = request.body(body_bytes);

    let upstream_response = match request.send().await {
        Ok(r) => r,
        Err(err) => {
            return (StatusCode::BAD_GATEWAY, format!("upstream request failed: {err}")).into_response();
        }
    };

    let status = upstream_response.status();
    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in upstream_response.headers().iter() {
        if HOP_BY_HOP.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }

    let stream = upstream_response.bytes_stream();
    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
