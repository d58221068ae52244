//! Configuration loading from the environment.

use std::env;

use crate::config::schema::{
    AuthConfig, CorsConfig, Environment, GatewayConfig, IdTokenConfig, LedgerConfig, OidcConfig,
    RateLimitConfig, ServerConfig, SessionConfig, SessionPolicy, UpstreamConfig,
};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from process environment variables.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    load_with(|key| env::var(key).ok())
}

/// Load configuration through an injectable variable lookup. Both structural
/// problems (missing required variables) and semantic ones (bad URLs, zero
/// limits) are collected and reported together.
pub fn load_with<F>(lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let upstream_url = var("COMPUTE_API_URL").unwrap_or_else(|| {
        errors.push(ValidationError::missing("COMPUTE_API_URL"));
        String::new()
    });

    let session_secret = var("SESSION_SECRET").unwrap_or_else(|| {
        errors.push(ValidationError::missing("SESSION_SECRET"));
        String::new()
    });

    // The identity-token mode wins when its client id is set; otherwise the
    // PKCE flow is required.
    let auth = if let Some(client_id) = var("ID_TOKEN_CLIENT_ID") {
        AuthConfig::IdToken(IdTokenConfig {
            client_id,
            hosted_domain: var("ID_TOKEN_HOSTED_DOMAIN"),
            introspection_url: var("ID_TOKEN_INTROSPECTION_URL")
                .unwrap_or_else(|| "https://oauth2.googleapis.com/tokeninfo".to_string()),
        })
    } else {
        let mut missing = Vec::new();
        let issuer = var("OIDC_ISSUER").unwrap_or_else(|| {
            missing.push("OIDC_ISSUER");
            String::new()
        });
        let client_id = var("OIDC_CLIENT_ID").unwrap_or_else(|| {
            missing.push("OIDC_CLIENT_ID");
            String::new()
        });
        let callback_url = var("OIDC_CALLBACK_URL").unwrap_or_else(|| {
            missing.push("OIDC_CALLBACK_URL");
            String::new()
        });
        for field in missing {
            errors.push(ValidationError::missing(field));
        }
        AuthConfig::Oidc(OidcConfig {
            issuer,
            client_id,
            callback_url,
        })
    };

    let environment = match var("ENVIRONMENT").as_deref() {
        Some("production") => Environment::Production,
        Some("development") | None => Environment::Development,
        Some(other) => {
            errors.push(ValidationError::invalid(
                "ENVIRONMENT",
                format!("unknown environment '{}'", other),
            ));
            Environment::Development
        }
    };

    let policy = match var("SESSION_POLICY").as_deref() {
        Some("multi") => SessionPolicy::Multi,
        Some("single-active") | None => SessionPolicy::SingleActive,
        Some(other) => {
            errors.push(ValidationError::invalid(
                "SESSION_POLICY",
                format!("expected 'single-active' or 'multi', got '{}'", other),
            ));
            SessionPolicy::SingleActive
        }
    };

    let parse_u64 = |key: &str, default: u64, errors: &mut Vec<ValidationError>| {
        match var(key).map(|v| v.parse::<u64>()) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                errors.push(ValidationError::invalid(key, "not a number"));
                default
            }
            None => default,
        }
    };
    let parse_u32 = |key: &str, default: u32, errors: &mut Vec<ValidationError>| {
        match var(key).map(|v| v.parse::<u32>()) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                errors.push(ValidationError::invalid(key, "not a number"));
                default
            }
            None => default,
        }
    };

    let defaults = GatewayConfig::default();
    let config = GatewayConfig {
        server: ServerConfig {
            bind_address: var("BIND_ADDRESS").unwrap_or(defaults.server.bind_address),
            environment,
            metrics_address: var("METRICS_ADDRESS"),
        },
        upstream: UpstreamConfig {
            base_url: upstream_url,
            timeout_ms: parse_u64("PROXY_TIMEOUT_MS", defaults.upstream.timeout_ms, &mut errors),
        },
        session: SessionConfig {
            secret: session_secret,
            max_age_ms: parse_u64("SESSION_MAX_AGE_MS", defaults.session.max_age_ms, &mut errors),
            redis_url: var("REDIS_URL"),
        },
        auth,
        rate_limit: RateLimitConfig {
            auth_per_window: parse_u32(
                "AUTH_RATE_LIMIT_PER_MIN",
                defaults.rate_limit.auth_per_window,
                &mut errors,
            ),
            api_per_window: parse_u32(
                "API_RATE_LIMIT_PER_MIN",
                defaults.rate_limit.api_per_window,
                &mut errors,
            ),
            window_secs: defaults.rate_limit.window_secs,
        },
        cors: CorsConfig {
            allowed_origins: match var("CORS_ORIGINS") {
                Some(raw) => raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => defaults.cors.allowed_origins,
            },
        },
        ledger: LedgerConfig {
            path: var("LEDGER_PATH")
                .map(Into::into)
                .unwrap_or(defaults.ledger.path),
            policy,
        },
    };

    errors.extend(validate_config(&config).err().unwrap_or_default());

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Validation(errors))
    }
}
