//! /auth/* endpoint handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::flow::{self, CallbackQuery, FlowState};
use crate::auth::identity::Identity;
use crate::auth::oidc::authorize_url;
use crate::auth::pkce::PkceState;
use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::cookie::{
    build_clear_cookie, build_session_cookie, session_id_from_headers, CookieOptions,
};
use crate::session::{SessionData, SessionError};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "idToken", alias = "id_token")]
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Option<UserView>,
    #[serde(rename = "workSessionId", skip_serializing_if = "Option::is_none")]
    pub work_session_id: Option<String>,
}

fn session_failure(e: SessionError) -> GatewayError {
    GatewayError::Authentication(format!("session store error: {}", e))
}

fn cookie_options(state: &AppState) -> CookieOptions {
    CookieOptions {
        max_age: std::time::Duration::from_millis(state.config.session.max_age_ms),
        secure: state.config.server.environment.is_production(),
    }
}

/// Load the request's session or start a fresh one.
async fn session_for_request(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, SessionData), GatewayError> {
    if let Some(id) = session_id_from_headers(headers, &state.config.session.secret) {
        if let Some(data) = state.sessions.load(&id).await.map_err(session_failure)? {
            return Ok((id, data));
        }
    }
    state.sessions.create().await.map_err(session_failure)
}

/// GET /auth/login: begin the PKCE flow and redirect to the issuer.
pub async fn login_redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let oidc = state
        .config
        .auth
        .oidc()
        .ok_or_else(|| GatewayError::Authentication("login flow not configured".to_string()))?;

    let (session_id, mut data) = session_for_request(&state, &headers).await?;

    let pkce = PkceState::new();
    let destination = authorize_url(oidc, &pkce);

    data.pkce = Some(pkce);
    data.user = None;
    state
        .sessions
        .save(&session_id, &data)
        .await
        .map_err(session_failure)?;

    tracing::info!("User initiating login, redirecting to authorization endpoint");

    let cookie = build_session_cookie(
        &session_id,
        &state.config.session.secret,
        cookie_options(&state),
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&destination)).into_response())
}

/// GET /auth/callback: validate state, exchange the code, establish session.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, GatewayError> {
    let issuer = state
        .issuer
        .clone()
        .ok_or_else(|| GatewayError::Authentication("login flow not configured".to_string()))?;

    let session_id = session_id_from_headers(&headers, &state.config.session.secret)
        .ok_or_else(|| GatewayError::Authentication("no login flow on this session".to_string()))?;
    let mut data = state
        .sessions
        .load(&session_id)
        .await
        .map_err(session_failure)?
        .ok_or_else(|| GatewayError::Authentication("session expired".to_string()))?;

    // Transient PKCE state is read-once: clear it before any issuer I/O so
    // a failed callback cannot be replayed
    let pkce = data.pkce.take();
    state
        .sessions
        .save(&session_id, &data)
        .await
        .map_err(session_failure)?;

    let stored = match pkce {
        Some(pkce) => FlowState::AwaitingCallback(pkce),
        None => FlowState::NoFlow,
    };

    let exchange = match flow::step(stored, flow::FlowEvent::Callback(query)) {
        FlowState::TokenExchange(exchange) => exchange,
        FlowState::Failed(e) => {
            tracing::warn!(error = %e, "Callback rejected");
            metrics::record_auth_failure("pkce_callback");
            return Err(GatewayError::Authentication(e.to_string()));
        }
        other => {
            tracing::error!(state = ?other, "Unexpected flow state on callback");
            return Err(GatewayError::Authentication("invalid login flow".to_string()));
        }
    };

    let token = issuer
        .exchange_code(&exchange.code, &exchange.verifier)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Token exchange failed");
            metrics::record_auth_failure("token_exchange");
            GatewayError::Authentication(e.to_string())
        })?;

    let identity: Identity = issuer
        .fetch_userinfo(&token.access_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Userinfo fetch failed");
            metrics::record_auth_failure("userinfo");
            GatewayError::Authentication(e.to_string())
        })?
        .into();

    tracing::info!(user_id = %identity.id, "Authentication successful");

    // Fixation defence: fresh id before the identity is attached
    data.user = Some(identity);
    data.pkce = None;
    let new_id = state
        .sessions
        .regenerate(Some(&session_id), &data)
        .await
        .map_err(session_failure)?;

    let destination = format!("{}/dashboard", state.config.cors.frontend_origin());
    let cookie = build_session_cookie(
        &new_id,
        &state.config.session.secret,
        cookie_options(&state),
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&destination)).into_response())
}

/// POST /auth/login: verify a pre-issued identity token, establish session.
pub async fn login_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, GatewayError> {
    let verifier = state
        .verifier
        .clone()
        .ok_or_else(|| GatewayError::Authentication("token login not configured".to_string()))?;

    let identity = verifier.verify(&request.id_token).await.map_err(|e| {
        tracing::warn!(error = %e, "Identity token verification failed");
        metrics::record_auth_failure("id_token");
        GatewayError::Authentication("invalid bearer token".to_string())
    })?;

    tracing::info!(user_id = %identity.id, "Authentication successful");

    let old_id = session_id_from_headers(&headers, &state.config.session.secret);
    let data = SessionData {
        user: Some(identity),
        pkce: None,
    };
    let new_id = state
        .sessions
        .regenerate(old_id.as_deref(), &data)
        .await
        .map_err(session_failure)?;

    let body = SessionResponse {
        authenticated: true,
        user: data.user.as_ref().map(UserView::from),
        work_session_id: None,
    };
    let cookie = build_session_cookie(
        &new_id,
        &state.config.session.secret,
        cookie_options(&state),
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn destroy_session(state: &AppState, headers: &HeaderMap) {
    if let Some(id) = session_id_from_headers(headers, &state.config.session.secret) {
        if let Err(e) = state.sessions.destroy(&id).await {
            tracing::error!(error = %e, "Session destruction failed");
        } else {
            tracing::info!("User logged out");
        }
    }
}

/// GET /auth/logout: destroy the session and send the browser home.
pub async fn logout_redirect(State(state): State<AppState>, headers: HeaderMap) -> Response {
    destroy_session(&state, &headers).await;
    let destination = format!("{}/", state.config.cors.frontend_origin());
    let cookie = build_clear_cookie(state.config.server.environment.is_production());
    ([(header::SET_COOKIE, cookie)], Redirect::to(&destination)).into_response()
}

/// POST /auth/logout: destroy the session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    destroy_session(&state, &headers).await;
    let cookie = build_clear_cookie(state.config.server.environment.is_production());
    ([(header::SET_COOKIE, cookie)], StatusCode::NO_CONTENT).into_response()
}

/// GET /auth/session: current identity and any known work-session.
pub async fn session_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, GatewayError> {
    let data = match session_id_from_headers(&headers, &state.config.session.secret) {
        Some(id) => state.sessions.load(&id).await.map_err(session_failure)?,
        None => None,
    };

    let Some(identity) = data.and_then(|d| d.user) else {
        return Ok(Json(SessionResponse {
            authenticated: false,
            user: None,
            work_session_id: None,
        }));
    };

    let work_session_id = state
        .ledger
        .lookup(&identity.id)
        .await
        .map_err(|e| GatewayError::LedgerCorruption(e.to_string()))?
        .map(|record| record.session_id);

    Ok(Json(SessionResponse {
        authenticated: true,
        user: Some(UserView::from(&identity)),
        work_session_id,
    }))
}
