//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits so a config can be dumped for diagnostics
//! or constructed directly in tests.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, environment, metrics).
    pub server: ServerConfig,

    /// Compute-service (upstream) settings.
    pub upstream: UpstreamConfig,

    /// Cookie session settings.
    pub session: SessionConfig,

    /// Which login protocol is active, and its issuer settings.
    pub auth: AuthConfig,

    /// Fixed-window rate limit thresholds.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin allowlist.
    pub cors: CorsConfig,

    /// Work-session ledger settings.
    pub ledger: LedgerConfig,
}

/// Deployment environment. Drives cookie `Secure` and CSP relaxations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Deployment environment.
    pub environment: Environment,

    /// Optional Prometheus scrape endpoint address.
    pub metrics_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            environment: Environment::Development,
            metrics_address: None,
        }
    }
}

/// Compute-service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the compute service (e.g., "http://localhost:5000").
    pub base_url: String,

    /// Timeout for proxied calls, in milliseconds. Mining operations run
    /// long, so this is deliberately larger than the issuer timeouts.
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Cookie session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keys the HMAC tag on session cookie values. Required; rotating it
    /// invalidates every outstanding cookie.
    pub secret: String,

    /// Cookie max-age in milliseconds.
    pub max_age_ms: u64,

    /// Shared session store connection string. When set, sessions live in
    /// Redis so any instance behind a load balancer can serve any request;
    /// when unset, sessions live in process memory (single instance only).
    pub redis_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            max_age_ms: 86_400_000,
            redis_url: None,
        }
    }
}

/// Active login protocol.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthConfig {
    /// OAuth2 Authorization Code + PKCE against an OIDC issuer.
    Oidc(OidcConfig),

    /// Server-side verification of a pre-issued identity token.
    IdToken(IdTokenConfig),

    /// No auth configured yet. Rejected by validation.
    #[default]
    Unconfigured,
}

impl AuthConfig {
    pub fn oidc(&self) -> Option<&OidcConfig> {
        match self {
            AuthConfig::Oidc(c) => Some(c),
            _ => None,
        }
    }

    pub fn id_token(&self) -> Option<&IdTokenConfig> {
        match self {
            AuthConfig::IdToken(c) => Some(c),
            _ => None,
        }
    }
}

/// OIDC issuer settings for the PKCE flow.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OidcConfig {
    /// Issuer base URL; `/authorize`, `/access_token` and `/userinfo` hang
    /// off of it.
    pub issuer: String,

    /// Public client identifier. No client secret exists in this flow.
    pub client_id: String,

    /// Redirect URI registered with the issuer.
    pub callback_url: String,
}

/// Identity-token verification settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IdTokenConfig {
    /// Expected `aud` claim.
    pub client_id: String,

    /// When set, the token's hosted-domain claim must match exactly.
    pub hosted_domain: Option<String>,

    /// Remote introspection endpoint consulted per request.
    pub introspection_url: String,
}

/// Fixed-window rate limit thresholds, per endpoint class.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per window on `/auth/*`.
    pub auth_per_window: u32,

    /// Requests per window on `/api/*`.
    pub api_per_window: u32,

    /// Window size in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_per_window: 30,
            api_per_window: 300,
            window_secs: 60,
        }
    }
}

/// Cross-origin allowlist.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. The first entry doubles as the frontend origin the
    /// gateway redirects to after login/logout.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Origin the browser is sent back to after auth flows.
    pub fn frontend_origin(&self) -> &str {
        self.allowed_origins
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost:5173")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// Work-session ownership policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPolicy {
    /// At most one non-terminal work-session per user; a second creation
    /// attempt is refused with 409.
    #[default]
    SingleActive,

    /// Any number of concurrent work-sessions per user.
    Multi,
}

/// Work-session ledger settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path of the flat tabular ledger file.
    pub path: PathBuf,

    /// Ownership policy. Exactly one is active at a time.
    pub policy: SessionPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/user-sessions.csv"),
            policy: SessionPolicy::SingleActive,
        }
    }
}
