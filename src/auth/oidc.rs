//! OIDC issuer client for the PKCE flow.
//!
//! # Responsibilities
//! - Build the authorization redirect URL
//! - Exchange an authorization code + verifier for tokens
//! - Fetch profile claims from the userinfo endpoint
//!
//! # Design Decisions
//! - Public client: no client secret is ever transmitted
//! - Issuer calls are bounded at seconds scale; any HTTP error surfaces as
//!   an authentication failure, never an automatic retry

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::auth::identity::Identity;
use crate::auth::pkce::{derive_challenge, PkceState};
use crate::config::OidcConfig;

const ISSUER_TIMEOUT: Duration = Duration::from_secs(10);

/// Token endpoint response. Only the access token is needed downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Userinfo endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub hd: Option<String>,
}

impl From<UserInfo> for Identity {
    fn from(info: UserInfo) -> Self {
        Identity {
            id: info.sub,
            email: info.email.unwrap_or_default(),
            display_name: info
                .name
                .or(info.preferred_username)
                .unwrap_or_else(|| "User".to_string()),
            hosted_domain: info.hd,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("issuer request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("issuer returned {status} from {endpoint}")]
    Status {
        endpoint: &'static str,
        status: u16,
    },
}

/// Issuer-side operations of the PKCE flow. The HTTP implementation is the
/// production path; tests substitute a fake.
#[async_trait]
pub trait IssuerClient: Send + Sync {
    async fn exchange_code(&self, code: &str, verifier: &str)
        -> Result<TokenResponse, IssuerError>;
    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, IssuerError>;
}

/// Build the `{issuer}/authorize` redirect URL for a fresh flow.
pub fn authorize_url(config: &OidcConfig, pkce: &PkceState) -> String {
    let mut url = Url::parse(&format!("{}/authorize", config.issuer.trim_end_matches('/')))
        .expect("issuer URL validated at startup");
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.callback_url)
        .append_pair("scope", "openid profile email")
        .append_pair("state", &pkce.state)
        .append_pair("code_challenge", &derive_challenge(&pkce.verifier))
        .append_pair("code_challenge_method", "S256");
    url.to_string()
}

/// Production issuer client over HTTP.
pub struct HttpIssuerClient {
    http: reqwest::Client,
    config: OidcConfig,
}

impl HttpIssuerClient {
    pub fn new(config: OidcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(ISSUER_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, config }
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.config.issuer.trim_end_matches('/'), suffix)
    }
}

#[async_trait]
impl IssuerClient for HttpIssuerClient {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<TokenResponse, IssuerError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(self.endpoint("access_token"))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IssuerError::Status {
                endpoint: "access_token",
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, IssuerError> {
        let response = self
            .http
            .get(self.endpoint("userinfo"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IssuerError::Status {
                endpoint: "userinfo",
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OidcConfig {
        OidcConfig {
            issuer: "https://issuer.example.com/oauth2".to_string(),
            client_id: "gateway".to_string(),
            callback_url: "http://localhost:3000/auth/callback".to_string(),
        }
    }

    #[test]
    fn authorize_url_carries_pkce_parameters() {
        let pkce = PkceState {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "anti-csrf".to_string(),
        };
        let url = authorize_url(&config(), &pkce);
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.path(), "/oauth2/authorize");
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "gateway");
        assert_eq!(pairs["state"], "anti-csrf");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(
            pairs["code_challenge"],
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        // Public client: the verifier itself must never appear in the URL
        assert!(!url.contains(&pkce.verifier));
    }

    #[test]
    fn userinfo_mapping_prefers_name_then_username() {
        let info = UserInfo {
            sub: "sub-1".to_string(),
            email: None,
            name: None,
            preferred_username: Some("j.doe".to_string()),
            hd: None,
        };
        let identity: Identity = info.into();
        assert_eq!(identity.display_name, "j.doe");
        assert_eq!(identity.email, "");

        let info = UserInfo {
            sub: "sub-1".to_string(),
            email: Some("j@corp.com".to_string()),
            name: Some("Jane Doe".to_string()),
            preferred_username: Some("j.doe".to_string()),
            hd: Some("corp.com".to_string()),
        };
        let identity: Identity = info.into();
        assert_eq!(identity.display_name, "Jane Doe");
        assert_eq!(identity.hosted_domain.as_deref(), Some("corp.com"));
    }
}
