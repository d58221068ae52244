//! PKCE login flow as an explicit state machine.
//!
//! # States
//! ```text
//! NoFlow → AwaitingCallback → TokenExchange → Authenticated
//!                    \________________\______→ Failed (terminal)
//! ```
//!
//! # Design Decisions
//! - `step` is a pure function over (state, event); the handlers drive
//!   issuer I/O between transitions, so every failure path is testable
//!   without a network
//! - State mismatch, provider-reported errors, and a missing verifier all
//!   fail closed into `Failed`; a new flow starts only via /auth/login

use serde::Deserialize;

use crate::auth::identity::Identity;
use crate::auth::pkce::PkceState;

/// Query parameters the issuer sends to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Inputs for the token-endpoint call, produced by a valid callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchange {
    pub code: String,
    pub verifier: String,
}

/// Why a flow ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The issuer reported an error on the callback.
    #[error("provider error: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Returned `state` did not equal the stored value (anti-CSRF).
    #[error("invalid state parameter")]
    StateMismatch,

    /// Callback arrived without an authorization code.
    #[error("no authorization code")]
    MissingCode,

    /// No verifier stored; the flow was not initiated on this session.
    #[error("no code verifier in session")]
    MissingVerifier,

    /// Token or userinfo call to the issuer failed.
    #[error("issuer request failed: {0}")]
    Issuer(String),
}

/// Current position in the login protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    NoFlow,
    AwaitingCallback(PkceState),
    TokenExchange(TokenExchange),
    Authenticated(Identity),
    Failed(FlowError),
}

/// Events that move the flow forward.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// /auth/login generated fresh PKCE parameters.
    Begin(PkceState),
    /// The issuer redirected back to /auth/callback.
    Callback(CallbackQuery),
    /// The issuer accepted the code and verifier.
    Profile(Identity),
    /// The issuer rejected a token or userinfo request.
    Issuer(String),
}

/// Pure transition function. Unknown (state, event) pairs fail closed.
pub fn step(state: FlowState, event: FlowEvent) -> FlowState {
    match (state, event) {
        (_, FlowEvent::Begin(pkce)) => FlowState::AwaitingCallback(pkce),

        (FlowState::AwaitingCallback(pkce), FlowEvent::Callback(query)) => {
            match accept_callback(&pkce, &query) {
                Ok(exchange) => FlowState::TokenExchange(exchange),
                Err(e) => FlowState::Failed(e),
            }
        }
        (FlowState::NoFlow, FlowEvent::Callback(_)) => FlowState::Failed(FlowError::MissingVerifier),

        (FlowState::TokenExchange(_), FlowEvent::Profile(identity)) => {
            FlowState::Authenticated(identity)
        }
        (FlowState::TokenExchange(_), FlowEvent::Issuer(msg)) => {
            FlowState::Failed(FlowError::Issuer(msg))
        }

        (FlowState::Failed(e), _) => FlowState::Failed(e),
        (_, _) => FlowState::Failed(FlowError::MissingVerifier),
    }
}

/// Validate the callback against the stored PKCE state.
///
/// Order matters: a provider-reported error wins, then the anti-CSRF state
/// check, then code presence.
fn accept_callback(pkce: &PkceState, query: &CallbackQuery) -> Result<TokenExchange, FlowError> {
    if let Some(error) = &query.error {
        return Err(FlowError::Provider {
            error: error.clone(),
            description: query.error_description.clone(),
        });
    }

    if query.state.as_deref() != Some(pkce.state.as_str()) {
        return Err(FlowError::StateMismatch);
    }

    let code = query.code.clone().ok_or(FlowError::MissingCode)?;

    Ok(TokenExchange {
        code,
        verifier: pkce.verifier.clone(),
    })
}
