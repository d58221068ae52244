//! Proxy handler and upstream health aggregation.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::auth::identity::Identity;
use crate::config::SessionPolicy;
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::cookie::session_id_from_headers;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const INTERCEPT_BODY_LIMIT: usize = 1024 * 1024;

/// Work-session creation response from the compute service.
#[derive(Debug, Deserialize)]
struct CreatedWorkSession {
    session_id: String,
}

/// Resolve the trusted identity for a request, or fail with 401.
pub(crate) async fn authenticated_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Identity, GatewayError> {
    let session_id = session_id_from_headers(headers, &state.config.session.secret)
        .ok_or_else(|| GatewayError::Authentication("missing session cookie".to_string()))?;

    let data = state
        .sessions
        .load(&session_id)
        .await
        .map_err(|e| GatewayError::Authentication(e.to_string()))?
        .ok_or_else(|| GatewayError::Authentication("session expired".to_string()))?;

    data.user
        .ok_or_else(|| GatewayError::Authentication("login required".to_string()))
}

/// Main proxy handler for `/api/*`.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let path_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    // 1. Authenticate from the server-side session, before any upstream I/O
    let identity = match authenticated_identity(&state, request.headers()).await {
        Ok(identity) => identity,
        Err(e) => {
            metrics::record_auth_failure("proxy");
            return e.into_response();
        }
    };

    tracing::debug!(
        method = %method,
        path = %path,
        user_id = %identity.id,
        "Proxying request"
    );

    // 2. Single-active policy pre-flight on work-session creation
    let creating = method == Method::POST && path == "/api/sessions";
    if creating && state.config.ledger.policy == SessionPolicy::SingleActive {
        match state.ledger.lookup(&identity.id).await {
            Ok(Some(record)) if !record.status.is_terminal() => {
                tracing::warn!(
                    user_id = %identity.id,
                    session_id = %record.session_id,
                    "Refused second work-session under single-active policy"
                );
                return GatewayError::Conflict {
                    session_id: record.session_id,
                }
                .into_response();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(user_id = %identity.id, error = %e, "Ledger lookup failed");
                return GatewayError::LedgerCorruption(e.to_string()).into_response();
            }
        }
    }

    // 3. Build the upstream request: same method/body/query, sanitized headers
    let uri_str = format!(
        "{}{}",
        state.config.upstream.base_url.trim_end_matches('/'),
        path_query
    );
    let uri: Uri = match uri_str.parse() {
        Ok(uri) => uri,
        Err(e) => {
            return GatewayError::UpstreamUnavailable(format!("bad upstream uri: {}", e))
                .into_response()
        }
    };

    let (parts, body) = request.into_parts();
    let mut upstream_request = Request::builder()
        .method(method.clone())
        .uri(uri)
        .body(body)
        .expect("request parts already validated by axum");

    {
        // Headers move over wholesale so repeated names (Cookie, Warning,
        // Via) keep every value
        let headers = upstream_request.headers_mut();
        *headers = parts.headers;
        // Let the client stack derive Host from the upstream authority
        headers.remove(header::HOST);
        // Identity headers come exclusively from the session; whatever the
        // client sent under these names is discarded
        headers.remove(X_USER_ID);
        headers.remove(X_USER_EMAIL);
        if let Ok(value) = HeaderValue::from_str(&identity.id) {
            headers.insert(X_USER_ID, value);
        }
        if let Ok(value) = HeaderValue::from_str(&identity.email) {
            headers.insert(X_USER_EMAIL, value);
        }
    }

    // 4. Forward, bounded by the long-operation timeout
    let timeout = Duration::from_millis(state.config.upstream.timeout_ms);
    let outcome = tokio::time::timeout(timeout, state.client.request(upstream_request)).await;

    let response = match outcome {
        Err(_) => {
            tracing::error!(path = %path, timeout_ms = state.config.upstream.timeout_ms, "Upstream timed out");
            metrics::record_request(method.as_str(), 504, start);
            return GatewayError::UpstreamTimeout(state.config.upstream.timeout_ms).into_response();
        }
        Ok(Err(e)) => {
            tracing::error!(path = %path, error = %e, "Upstream request failed");
            metrics::record_request(method.as_str(), 502, start);
            return GatewayError::UpstreamUnavailable(e.to_string()).into_response();
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    metrics::record_request(method.as_str(), status.as_u16(), start);

    // 5. Intercept confirmed work-session creation and record ownership.
    //    The upstream has already committed the creation, so an unrecordable
    //    reply forfeits the ledger entry rather than the response
    if creating && status == StatusCode::CREATED {
        let declared = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(length) = declared.filter(|length| *length > INTERCEPT_BODY_LIMIT) {
            tracing::warn!(
                content_length = length,
                "Work-session creation reply too large to inspect, forwarding unrecorded"
            );
            metrics::record_ledger_write("skipped");
            let (head, body) = response.into_parts();
            return Response::from_parts(head, Body::new(body)).into_response();
        }

        let (head, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(Body::new(body), INTERCEPT_BODY_LIMIT).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // The body is part-consumed here and cannot be forwarded
                tracing::error!(error = %e, "Failed to read work-session creation body");
                metrics::record_ledger_write("skipped");
                return GatewayError::UpstreamUnavailable(e.to_string()).into_response();
            }
        };

        match serde_json::from_slice::<CreatedWorkSession>(&bytes) {
            Ok(created) => {
                // Ledger write happens off the response path; a failure is
                // logged but the already-built reply is unaffected
                let ledger = state.ledger.clone();
                let user_id = identity.id.clone();
                let email = identity.email.clone();
                tokio::spawn(async move {
                    match ledger.create(&user_id, &created.session_id, &email).await {
                        Ok(_) => metrics::record_ledger_write("ok"),
                        Err(e) => {
                            metrics::record_ledger_write("error");
                            tracing::error!(
                                user_id = %user_id,
                                session_id = %created.session_id,
                                error = %e,
                                "Failed to record work-session"
                            );
                        }
                    }
                });
            }
            Err(e) => {
                metrics::record_ledger_write("skipped");
                tracing::error!(error = %e, "Work-session creation body was not parseable");
            }
        }

        return Response::from_parts(head, Body::from(bytes)).into_response();
    }

    let (head, body) = response.into_parts();
    Response::from_parts(head, Body::new(body)).into_response()
}

/// Unauthenticated aggregate health: gateway + compute service.
pub async fn api_health(State(state): State<AppState>) -> Response {
    let url = format!(
        "{}/api/health",
        state.config.upstream.base_url.trim_end_matches('/')
    );

    match state
        .http
        .get(&url)
        .timeout(HEALTH_PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            let upstream: serde_json::Value = response
                .json()
                .await
                .unwrap_or_else(|_| serde_json::json!("ok"));
            Json(serde_json::json!({
                "gateway": "ok",
                "upstream": upstream,
            }))
            .into_response()
        }
        Ok(response) => {
            tracing::error!(url = %url, status = %response.status(), "Upstream health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "gateway": "ok",
                    "upstream": "unavailable",
                    "status": response.status().as_u16(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Upstream health probe unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "gateway": "ok",
                    "upstream": "unavailable",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
