//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the loader handles presence)
//! - URL syntax for the upstream, issuer and callback endpoints
//! - Value ranges (timeouts > 0, rate limits > 0, max-age > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs once at startup; the process refuses to serve on failure

use url::Url;

use crate::config::schema::{AuthConfig, GatewayConfig};

/// A single configuration problem, attributed to the variable that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "required but not set".to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a fully built configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let check_url = |field: &str, value: &str, errors: &mut Vec<ValidationError>| {
        if !value.is_empty() && Url::parse(value).is_err() {
            errors.push(ValidationError::invalid(
                field,
                format!("'{}' is not a valid URL", value),
            ));
        }
    };

    check_url("COMPUTE_API_URL", &config.upstream.base_url, &mut errors);

    match &config.auth {
        AuthConfig::Oidc(oidc) => {
            check_url("OIDC_ISSUER", &oidc.issuer, &mut errors);
            check_url("OIDC_CALLBACK_URL", &oidc.callback_url, &mut errors);
        }
        AuthConfig::IdToken(id_token) => {
            check_url(
                "ID_TOKEN_INTROSPECTION_URL",
                &id_token.introspection_url,
                &mut errors,
            );
        }
        AuthConfig::Unconfigured => {
            errors.push(ValidationError::missing(
                "OIDC_ISSUER/OIDC_CLIENT_ID or ID_TOKEN_CLIENT_ID",
            ));
        }
    }

    if config.upstream.timeout_ms == 0 {
        errors.push(ValidationError::invalid("PROXY_TIMEOUT_MS", "must be > 0"));
    }
    if config.session.max_age_ms == 0 {
        errors.push(ValidationError::invalid("SESSION_MAX_AGE_MS", "must be > 0"));
    }
    if config.rate_limit.auth_per_window == 0 {
        errors.push(ValidationError::invalid(
            "AUTH_RATE_LIMIT_PER_MIN",
            "must be > 0",
        ));
    }
    if config.rate_limit.api_per_window == 0 {
        errors.push(ValidationError::invalid(
            "API_RATE_LIMIT_PER_MIN",
            "must be > 0",
        ));
    }
    if config.cors.allowed_origins.is_empty() {
        errors.push(ValidationError::invalid("CORS_ORIGINS", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
