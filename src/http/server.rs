//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (CORS, security headers, rate limits, request IDs)
//! - Construct the shared state (session store, ledger, upstream clients)
//! - Bind to a listener and serve until shutdown

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    response::Json,
    routing::{any, get},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::auth::oidc::{HttpIssuerClient, IssuerClient};
use crate::auth::routes;
use crate::auth::verifier::TokenVerifier;
use crate::config::{AuthConfig, GatewayConfig};
use crate::error::GatewayError;
use crate::ledger::{CsvLedger, LedgerStore};
use crate::proxy::{api_health, proxy_handler};
use crate::security::headers::{security_headers_middleware, SecurityHeaderPolicy};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::session::SessionStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    /// Streaming client for proxied `/api/*` traffic.
    pub client: Client<HttpConnector, axum::body::Body>,
    /// JSON client for health probes.
    pub http: reqwest::Client,
    /// Present when the PKCE flow is configured.
    pub issuer: Option<Arc<dyn IssuerClient>>,
    /// Present when identity-token login is configured.
    pub verifier: Option<Arc<TokenVerifier>>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Construct the server and all its subsystems from a validated config.
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let max_age = Duration::from_millis(config.session.max_age_ms);
        let sessions = match &config.session.redis_url {
            Some(url) => {
                tracing::info!("Sessions backed by shared store");
                SessionStore::redis(url, max_age)
                    .await
                    .map_err(|e| GatewayError::Configuration(e.to_string()))?
            }
            None => {
                tracing::info!("Sessions backed by process memory");
                SessionStore::in_memory(max_age)
            }
        };

        let ledger = CsvLedger::new(config.ledger.path.clone(), config.ledger.policy)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let issuer: Option<Arc<dyn IssuerClient>> = config
            .auth
            .oidc()
            .map(|oidc| Arc::new(HttpIssuerClient::new(oidc.clone())) as Arc<dyn IssuerClient>);
        let verifier = config
            .auth
            .id_token()
            .map(|id_token| Arc::new(TokenVerifier::new(id_token.clone())));

        let state = AppState {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            ledger: Arc::new(ledger),
            client,
            http: reqwest::Client::new(),
            issuer,
            verifier,
        };

        let router = Self::build_router(state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let auth_limiter = Arc::new(RateLimiter::new(
            "auth",
            config.rate_limit.auth_per_window,
            Duration::from_secs(config.rate_limit.window_secs),
        ));
        let api_limiter = Arc::new(RateLimiter::new(
            "api",
            config.rate_limit.api_per_window,
            Duration::from_secs(config.rate_limit.window_secs),
        ));
        let header_policy = Arc::new(SecurityHeaderPolicy::new(
            config.server.environment,
            &identity_origins(&config),
        ));

        let auth_routes = Router::new()
            .route(
                "/auth/login",
                get(routes::login_redirect).post(routes::login_token),
            )
            .route("/auth/callback", get(routes::callback))
            .route(
                "/auth/logout",
                get(routes::logout_redirect).post(routes::logout),
            )
            .route("/auth/session", get(routes::session_info))
            .layer(middleware::from_fn_with_state(
                auth_limiter,
                rate_limit_middleware,
            ));

        let api_routes = Router::new()
            .route("/api/health", get(api_health))
            .route("/api/{*path}", any(proxy_handler))
            .layer(middleware::from_fn_with_state(
                api_limiter,
                rate_limit_middleware,
            ));

        Router::new()
            .route("/health", get(health))
            .merge(auth_routes)
            .merge(api_routes)
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                header_policy,
                security_headers_middleware,
            ))
            .layer(cors_layer(&config))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = shutdown.recv() => {}
                }
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Gateway liveness. Does not touch the compute service.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Identity-provider origins the CSP must admit, derived from whichever
/// login protocol is configured.
fn identity_origins(config: &GatewayConfig) -> Vec<String> {
    let urls: Vec<&str> = match &config.auth {
        AuthConfig::Oidc(oidc) => vec![oidc.issuer.as_str()],
        AuthConfig::IdToken(id_token) => vec![id_token.introspection_url.as_str()],
        AuthConfig::Unconfigured => vec![],
    };

    urls.iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .map(|url| url.origin().ascii_serialization())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdTokenConfig, OidcConfig};

    #[test]
    fn identity_origins_reduce_urls_to_origins() {
        let mut config = GatewayConfig::default();
        config.auth = AuthConfig::Oidc(OidcConfig {
            issuer: "https://issuer.example.com/oauth2".to_string(),
            client_id: "gateway".to_string(),
            callback_url: "http://localhost:3000/auth/callback".to_string(),
        });
        assert_eq!(
            identity_origins(&config),
            vec!["https://issuer.example.com".to_string()]
        );

        config.auth = AuthConfig::IdToken(IdTokenConfig {
            client_id: "gateway".to_string(),
            hosted_domain: None,
            introspection_url: "https://verify.example.com/tokeninfo".to_string(),
        });
        assert_eq!(
            identity_origins(&config),
            vec!["https://verify.example.com".to_string()]
        );

        config.auth = AuthConfig::Unconfigured;
        assert!(identity_origins(&config).is_empty());
    }
}
