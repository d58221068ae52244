//! Login flow tests: identity-token verification and the PKCE redirect flow.

use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use mining_gateway::config::{AuthConfig, IdTokenConfig, OidcConfig};

mod common;

fn id_token_auth(introspection: std::net::SocketAddr) -> AuthConfig {
    AuthConfig::IdToken(IdTokenConfig {
        client_id: "gateway-client".to_string(),
        hosted_domain: None,
        introspection_url: format!("http://{}/tokeninfo", introspection),
    })
}

/// Introspection mock: `tok-good` maps to valid claims, `tok-wrong-aud` to a
/// foreign audience, anything else to a 400 error body.
async fn start_introspection() -> std::net::SocketAddr {
    common::start_mock_server(|request| async move {
        let token = request
            .path
            .split("id_token=")
            .nth(1)
            .unwrap_or_default()
            .to_string();
        match token.as_str() {
            "tok-good" => (
                200,
                serde_json::json!({
                    "sub": "user-1",
                    "aud": "gateway-client",
                    "email": "miner@corp.com",
                    "email_verified": "true",
                    "name": "Miner One",
                })
                .to_string(),
            ),
            "tok-wrong-aud" => (
                200,
                serde_json::json!({
                    "sub": "user-1",
                    "aud": "someone-else",
                    "email": "miner@corp.com",
                })
                .to_string(),
            ),
            _ => (
                400,
                serde_json::json!({
                    "error": "invalid_token",
                    "error_description": "Invalid Value",
                })
                .to_string(),
            ),
        }
    })
    .await
}

#[tokio::test]
async fn token_login_establishes_a_session() {
    let introspection = start_introspection().await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = id_token_auth(introspection);
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let response = client
        .post(format!("http://{}/auth/login", addr))
        .json(&serde_json::json!({ "idToken": "tok-good" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cookie = common::session_cookie(&response).expect("login must set the session cookie");

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["email"], "miner@corp.com");
    assert_eq!(body["user"]["displayName"], "Miner One");

    // The cookie now authenticates /auth/session
    let response = client
        .get(format!("http://{}/auth/session", addr))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["id"], "user-1");
}

#[tokio::test]
async fn token_login_rejects_a_foreign_audience_without_a_cookie() {
    let introspection = start_introspection().await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = id_token_auth(introspection);
    let (addr, _shutdown) = common::start_gateway(config).await;

    let response = common::client()
        .post(format!("http://{}/auth/login", addr))
        .json(&serde_json::json!({ "idToken": "tok-wrong-aud" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(common::session_cookie(&response).is_none());
}

#[tokio::test]
async fn login_rotates_the_session_id() {
    let introspection = start_introspection().await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = id_token_auth(introspection);
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let first = client
        .post(format!("http://{}/auth/login", addr))
        .json(&serde_json::json!({ "idToken": "tok-good" }))
        .send()
        .await
        .unwrap();
    let first_cookie = common::session_cookie(&first).unwrap();

    // A second login presenting the old cookie must be issued a fresh id
    let second = client
        .post(format!("http://{}/auth/login", addr))
        .header("cookie", &first_cookie)
        .json(&serde_json::json!({ "idToken": "tok-good" }))
        .send()
        .await
        .unwrap();
    let second_cookie = common::session_cookie(&second).unwrap();
    assert_ne!(first_cookie, second_cookie);

    // The old id no longer authenticates
    let response = client
        .get(format!("http://{}/auth/session", addr))
        .header("cookie", &first_cookie)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn logout_destroys_the_session() {
    let introspection = start_introspection().await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = id_token_auth(introspection);
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let login = client
        .post(format!("http://{}/auth/login", addr))
        .json(&serde_json::json!({ "idToken": "tok-good" }))
        .send()
        .await
        .unwrap();
    let cookie = common::session_cookie(&login).unwrap();

    let logout = client
        .post(format!("http://{}/auth/logout", addr))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 204);

    let response = client
        .get(format!("http://{}/auth/session", addr))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["authenticated"], false);
}

/// Issuer mock serving the token and userinfo endpoints, capturing the
/// form body of the token exchange.
async fn start_issuer(captured_exchange: Arc<Mutex<Option<String>>>) -> std::net::SocketAddr {
    common::start_mock_server(move |request| {
        let captured = captured_exchange.clone();
        async move {
            if request.path.starts_with("/oauth2/access_token") {
                *captured.lock().unwrap() = Some(request.body.clone());
                (
                    200,
                    serde_json::json!({
                        "access_token": "at-123",
                        "token_type": "Bearer",
                    })
                    .to_string(),
                )
            } else if request.path.starts_with("/oauth2/userinfo") {
                (
                    200,
                    serde_json::json!({
                        "sub": "oidc-user-1",
                        "email": "miner@corp.com",
                        "name": "Miner One",
                    })
                    .to_string(),
                )
            } else {
                (404, "{}".to_string())
            }
        }
    })
    .await
}

fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url).ok()?.query_pairs().find_map(|(k, v)| {
        (k == name).then(|| v.into_owned())
    })
}

#[tokio::test]
async fn pkce_flow_end_to_end() {
    let captured_exchange = Arc::new(Mutex::new(None));
    let issuer = start_issuer(captured_exchange.clone()).await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = AuthConfig::Oidc(OidcConfig {
        issuer: format!("http://{}/oauth2", issuer),
        client_id: "gateway-client".to_string(),
        callback_url: "http://localhost:3000/auth/callback".to_string(),
    });
    config.cors.allowed_origins = vec!["http://localhost:5173".to_string()];
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();

    // 1. Login redirect carries the challenge, never the verifier
    let login = client
        .get(format!("http://{}/auth/login", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 303);
    let cookie = common::session_cookie(&login).expect("login must bind a session");
    let location = login.headers()["location"].to_str().unwrap().to_string();
    assert!(location.contains("/oauth2/authorize"));
    assert_eq!(query_param(&location, "code_challenge_method").as_deref(), Some("S256"));
    let state = query_param(&location, "state").expect("state parameter");
    assert!(query_param(&location, "code_verifier").is_none());

    // 2. Callback with the issuer's code and the original state
    let callback = client
        .get(format!(
            "http://{}/auth/callback?code=auth-code-1&state={}",
            addr, state
        ))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(callback.status(), 303);
    let location = callback.headers()["location"].to_str().unwrap();
    assert_eq!(location, "http://localhost:5173/dashboard");
    let authed_cookie = common::session_cookie(&callback).expect("callback must rotate the session");
    assert_ne!(authed_cookie, cookie);

    // The exchange sent the verifier, form-encoded, without a client secret
    let exchange_body = captured_exchange.lock().unwrap().clone().unwrap();
    assert!(exchange_body.contains("grant_type=authorization_code"));
    assert!(exchange_body.contains("code=auth-code-1"));
    assert!(exchange_body.contains("code_verifier="));
    assert!(!exchange_body.contains("client_secret"));

    // 3. The rotated cookie now authenticates
    let response = client
        .get(format!("http://{}/auth/session", addr))
        .header("cookie", &authed_cookie)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["id"], "oidc-user-1");
}

#[tokio::test]
async fn callback_rejects_a_forged_state() {
    let captured = Arc::new(Mutex::new(None));
    let issuer = start_issuer(captured.clone()).await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = AuthConfig::Oidc(OidcConfig {
        issuer: format!("http://{}/oauth2", issuer),
        client_id: "gateway-client".to_string(),
        callback_url: "http://localhost:3000/auth/callback".to_string(),
    });
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let login = client
        .get(format!("http://{}/auth/login", addr))
        .send()
        .await
        .unwrap();
    let cookie = common::session_cookie(&login).unwrap();

    let callback = client
        .get(format!(
            "http://{}/auth/callback?code=auth-code-1&state=forged",
            addr
        ))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();

    assert_eq!(callback.status(), 401);
    // The forged attempt never reached the token endpoint
    assert!(captured.lock().unwrap().is_none());
}

#[tokio::test]
async fn failed_callback_clears_the_pending_login() {
    let captured = Arc::new(Mutex::new(None));
    let issuer = start_issuer(captured.clone()).await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = AuthConfig::Oidc(OidcConfig {
        issuer: format!("http://{}/oauth2", issuer),
        client_id: "gateway-client".to_string(),
        callback_url: "http://localhost:3000/auth/callback".to_string(),
    });
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let login = client
        .get(format!("http://{}/auth/login", addr))
        .send()
        .await
        .unwrap();
    let cookie = common::session_cookie(&login).unwrap();
    let location = login.headers()["location"].to_str().unwrap().to_string();
    let state = query_param(&location, "state").unwrap();

    // A forged state fails the callback and burns the pending flow
    let forged = client
        .get(format!(
            "http://{}/auth/callback?code=auth-code-1&state=forged",
            addr
        ))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);

    // The genuine state is now worthless: the failure already consumed the
    // pending flow, so nothing ever reaches the token endpoint
    let retry = client
        .get(format!(
            "http://{}/auth/callback?code=auth-code-1&state={}",
            addr, state
        ))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(retry.status(), 401);
    assert!(captured.lock().unwrap().is_none());
}

#[tokio::test]
async fn callback_cannot_be_replayed() {
    let captured = Arc::new(Mutex::new(None));
    let issuer = start_issuer(captured).await;
    let upstream = common::start_mock_server(|_| async { (200, "{}".to_string()) }).await;
    let dir = tempdir().unwrap();

    let mut config = common::test_config(upstream, &dir.path().join("ledger.csv"));
    config.auth = AuthConfig::Oidc(OidcConfig {
        issuer: format!("http://{}/oauth2", issuer),
        client_id: "gateway-client".to_string(),
        callback_url: "http://localhost:3000/auth/callback".to_string(),
    });
    let (addr, _shutdown) = common::start_gateway(config).await;

    let client = common::client();
    let login = client
        .get(format!("http://{}/auth/login", addr))
        .send()
        .await
        .unwrap();
    let cookie = common::session_cookie(&login).unwrap();
    let location = login.headers()["location"].to_str().unwrap().to_string();
    let state = query_param(&location, "state").unwrap();

    let url = format!(
        "http://{}/auth/callback?code=auth-code-1&state={}",
        addr, state
    );
    let first = client
        .get(&url)
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 303);

    // The verifier was consumed; replaying the same callback fails
    let replay = client
        .get(&url)
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);
}
