//! Pre-issued identity token verification.
//!
//! # Responsibilities
//! - Call the issuer's introspection endpoint for every presented token
//! - Enforce audience, hosted-domain and email-verified claims
//! - Map validated claims to a trusted Identity
//!
//! # Design Decisions
//! - No local caching or offline signature verification: the remote call
//!   per request is a known latency/availability coupling carried over
//!   deliberately; claim checks themselves are pure and test offline
//! - A 400 from the introspection endpoint means "invalid token", not
//!   "introspection down"; both reject, with different log context

use serde::Deserialize;
use std::time::Duration;

use crate::auth::identity::Identity;
use crate::config::IdTokenConfig;

const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Claims the introspection endpoint reports for a token. Everything is
/// optional; validation decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Introspection endpoints report this as the string "true"/"false".
    #[serde(default)]
    pub email_verified: Option<String>,
    #[serde(default)]
    pub hd: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid audience (aud={0})")]
    BadAudience(String),

    #[error("invalid hosted domain (hd={0})")]
    BadHostedDomain(String),

    #[error("email not verified")]
    EmailNotVerified,

    #[error("introspection request failed: {0}")]
    Introspection(#[from] reqwest::Error),
}

/// Pure claim validation, ordered: token-level error, audience,
/// hosted-domain restriction, email verification.
pub fn validate_claims(claims: &TokenClaims, config: &IdTokenConfig) -> Result<Identity, VerifyError> {
    if claims.error.is_some() || claims.error_description.is_some() {
        let msg = claims
            .error_description
            .clone()
            .or_else(|| claims.error.clone())
            .unwrap_or_else(|| "invalid ID token".to_string());
        return Err(VerifyError::InvalidToken(msg));
    }

    let sub = claims
        .sub
        .clone()
        .ok_or_else(|| VerifyError::InvalidToken("missing subject".to_string()))?;

    match &claims.aud {
        Some(aud) if *aud == config.client_id => {}
        other => {
            return Err(VerifyError::BadAudience(
                other.clone().unwrap_or_else(|| "<none>".to_string()),
            ))
        }
    }

    if let Some(expected) = &config.hosted_domain {
        if claims.hd.as_deref() != Some(expected.as_str()) {
            return Err(VerifyError::BadHostedDomain(
                claims.hd.clone().unwrap_or_else(|| "<none>".to_string()),
            ));
        }
    }

    if claims
        .email_verified
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("false"))
    {
        return Err(VerifyError::EmailNotVerified);
    }

    let email = claims.email.clone().unwrap_or_default();
    Ok(Identity {
        display_name: claims
            .name
            .clone()
            .or_else(|| claims.email.clone())
            .unwrap_or_else(|| "User".to_string()),
        id: sub,
        email,
        hosted_domain: claims.hd.clone(),
    })
}

/// Verifies bearer identity tokens against a remote introspection endpoint.
pub struct TokenVerifier {
    http: reqwest::Client,
    config: IdTokenConfig,
}

impl TokenVerifier {
    pub fn new(config: IdTokenConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(INTROSPECTION_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, config }
    }

    /// Verify a token end to end: introspect remotely, then validate claims.
    pub async fn verify(&self, id_token: &str) -> Result<Identity, VerifyError> {
        let response = self
            .http
            .get(&self.config.introspection_url)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        let status = response.status();
        // 400 carries an error body for garbled/expired tokens
        if !status.is_success() && status.as_u16() != 400 {
            return Err(VerifyError::InvalidToken(format!(
                "introspection endpoint returned {}",
                status
            )));
        }

        let claims: TokenClaims = response.json().await?;
        validate_claims(&claims, &self.config)
    }
}
