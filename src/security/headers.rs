//! Security response headers.
//!
//! # Responsibilities
//! - Stamp every response with the hardening header table
//! - Build the CSP, including the identity-provider origins the login
//!   widget needs for scripts, styles, frames and XHR
//!
//! # Design Decisions
//! - The policy is computed once at startup and applied verbatim per
//!   response; environments differ only in enumerated dev relaxations
//!   ('unsafe-eval' and localhost connect sources for live-reload tooling)

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::Environment;

/// Declarative per-response header table.
pub struct SecurityHeaderPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaderPolicy {
    pub fn new(environment: Environment, identity_origins: &[String]) -> Self {
        let static_headers: [(&str, &str); 6] = [
            ("x-content-type-options", "nosniff"),
            ("referrer-policy", "strict-origin-when-cross-origin"),
            (
                "permissions-policy",
                "camera=(), microphone=(), geolocation=()",
            ),
            ("x-frame-options", "DENY"),
            // Identity widgets open popups; full same-origin would break them
            ("cross-origin-opener-policy", "same-origin-allow-popups"),
            ("cross-origin-resource-policy", "same-site"),
        ];

        let mut headers: Vec<(HeaderName, HeaderValue)> = static_headers
            .iter()
            .map(|(name, value)| {
                (
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                )
            })
            .collect();

        if let Ok(csp) = HeaderValue::from_str(&content_security_policy(
            environment,
            identity_origins,
        )) {
            headers.push((HeaderName::from_static("content-security-policy"), csp));
        }

        Self { headers }
    }

    pub fn apply(&self, response: &mut Response) {
        let target = response.headers_mut();
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Build the CSP string for an environment.
pub fn content_security_policy(environment: Environment, identity_origins: &[String]) -> String {
    let identity = identity_origins.join(" ");

    let mut script_src = format!("'self' {}", identity);
    let mut connect_src = format!("'self' {}", identity);
    let frame_src = if identity.is_empty() {
        "'none'".to_string()
    } else {
        identity.clone()
    };

    if !environment.is_production() {
        // Vite dev server needs eval and websocket HMR
        script_src.push_str(" 'unsafe-eval'");
        connect_src.push_str(" http://localhost:* ws://localhost:*");
    }

    [
        "default-src 'self'".to_string(),
        "base-uri 'self'".to_string(),
        "object-src 'none'".to_string(),
        "frame-ancestors 'none'".to_string(),
        "img-src 'self' data: https:".to_string(),
        format!("script-src {}", script_src.trim()),
        format!("style-src 'self' 'unsafe-inline' {}", identity)
            .trim_end()
            .to_string(),
        format!("connect-src {}", connect_src.trim()),
        format!("frame-src {}", frame_src),
        "form-action 'self'".to_string(),
    ]
    .join("; ")
}

/// Middleware stamping the policy onto every response.
pub async fn security_headers_middleware(
    State(policy): State<Arc<SecurityHeaderPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    policy.apply(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins() -> Vec<String> {
        vec!["https://accounts.idp.example".to_string()]
    }

    #[test]
    fn production_csp_has_no_dev_relaxations() {
        let csp = content_security_policy(Environment::Production, &origins());
        assert!(!csp.contains("'unsafe-eval'"));
        assert!(!csp.contains("localhost"));
        assert!(csp.contains("default-src 'self'"));
        assert!(csp.contains("frame-ancestors 'none'"));
        assert!(csp.contains("script-src 'self' https://accounts.idp.example"));
    }

    #[test]
    fn development_csp_enumerates_exact_relaxations() {
        let prod = content_security_policy(Environment::Production, &origins());
        let dev = content_security_policy(Environment::Development, &origins());

        assert!(dev.contains("'unsafe-eval'"));
        assert!(dev.contains("http://localhost:* ws://localhost:*"));

        // Nothing besides the enumerated relaxations differs
        let stripped = dev
            .replace(" 'unsafe-eval'", "")
            .replace(" http://localhost:* ws://localhost:*", "");
        assert_eq!(stripped, prod);
    }

    #[test]
    fn policy_applies_hardening_headers() {
        let policy = SecurityHeaderPolicy::new(Environment::Production, &origins());
        let mut response = Response::new(Body::empty());
        policy.apply(&mut response);

        let headers = response.headers();
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(
            headers["cross-origin-opener-policy"],
            "same-origin-allow-popups"
        );
        assert!(headers.contains_key("content-security-policy"));
    }

    #[test]
    fn no_identity_origins_still_yields_a_valid_policy() {
        let csp = content_security_policy(Environment::Production, &[]);
        assert!(csp.contains("frame-src 'none'"));
        assert!(csp.contains("script-src 'self'"));
    }
}
