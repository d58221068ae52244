//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - One error type for everything a handler can surface to a client
//! - Map each failure class to a distinct HTTP status so callers can tell
//!   "not authorized" (401) from "too fast" (429) from "backend down" (502/504)
//! - Rate-limit rejections carry limit/remaining/reset metadata
//!
//! # Design Decisions
//! - Configuration problems are startup-fatal and never reach a response;
//!   the variant exists only so `main` can report them uniformly
//! - Ledger corruption is surfaced (500) and logged, never auto-repaired

use axum::{
    http::{header::HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Error type for all request-level gateway failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing/invalid credential, failed claim check, or a broken PKCE flow.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A non-terminal work-session already exists for this user
    /// (single-active-session policy).
    #[error("active work-session {session_id} already exists")]
    Conflict { session_id: String },

    /// Fixed-window bucket exceeded for the current window.
    #[error("rate limit exceeded")]
    RateLimited {
        limit: u32,
        remaining: u32,
        reset_at: u64,
    },

    /// Compute service unreachable (connection refused, DNS failure, reset).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Compute service did not answer within the configured proxy timeout.
    #[error("upstream timed out after {0} ms")]
    UpstreamTimeout(u64),

    /// Ledger storage unreadable or unparseable.
    #[error("ledger corruption: {0}")]
    LedgerCorruption(String),

    /// Required secret/URL missing or invalid. Startup-time only.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Conflict { .. } => StatusCode::CONFLICT,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::LedgerCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::Authentication(msg) => json!({
                "error": "Not authenticated",
                "message": msg,
            }),
            GatewayError::Conflict { session_id } => json!({
                "error": "Active session exists",
                "sessionId": session_id,
            }),
            GatewayError::RateLimited { .. } => json!({
                "error": "Too Many Requests",
            }),
            GatewayError::UpstreamUnavailable(msg) => json!({
                "error": "Backend unavailable",
                "message": msg,
            }),
            GatewayError::UpstreamTimeout(ms) => json!({
                "error": "Backend timeout",
                "timeoutMs": ms,
            }),
            GatewayError::LedgerCorruption(msg) => json!({
                "error": "Session ledger unreadable",
                "message": msg,
            }),
            GatewayError::Configuration(msg) => json!({
                "error": "Internal Server Error",
                "message": msg,
            }),
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited {
            limit,
            remaining,
            reset_at,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, limit.into());
            headers.insert(X_RATELIMIT_REMAINING, remaining.into());
            headers.insert(X_RATELIMIT_RESET, reset_at.into());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_are_distinct() {
        assert_eq!(
            GatewayError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::UpstreamTimeout(30_000).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::RateLimited {
                limit: 1,
                remaining: 0,
                reset_at: 0
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn rate_limited_response_carries_metadata() {
        let response = GatewayError::RateLimited {
            limit: 30,
            remaining: 0,
            reset_at: 1_700_000_000,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "30");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
        assert_eq!(response.headers()[X_RATELIMIT_RESET], "1700000000");
    }
}
