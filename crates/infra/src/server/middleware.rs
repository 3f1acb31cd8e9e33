//! Request logging, trusted-subnet guard and response signing.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_domain::constants::{HASH_HEADER, REAL_IP_HEADER};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// One `info` line per request with method, uri, status and latency.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let span = info_span!("http_request", %request_id, %method, %uri);
    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject requests whose `X-Real-IP` is outside the trusted subnet.
pub async fn check_subnet(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(subnet) = &state.trusted_subnet else {
        return next.run(req).await;
    };

    let real_ip = req.headers().get(REAL_IP_HEADER).and_then(|value| value.to_str().ok());
    if !subnet.admits(real_ip) {
        warn!(real_ip = real_ip.unwrap_or("-"), %subnet, "request from untrusted address");
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(req).await
}

/// Sign the response body into the hash header when a key is configured.
pub async fn sign_response(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if !state.decoder.verifies_integrity() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to buffer response for signing");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(hash) = state.decoder.sign(&bytes) {
        if let Ok(value) = HeaderValue::from_str(&hash) {
            parts.headers.insert(HASH_HEADER, value);
        }
    }
    Response::from_parts(parts, Body::from(bytes))
}
