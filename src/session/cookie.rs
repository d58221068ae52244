//! Session cookie construction and extraction.
//!
//! # Design Decisions
//! - Attributes are fixed: HttpOnly, SameSite=Lax, Path=/, bounded Max-Age,
//!   Secure only when serving over TLS (production)
//! - The cookie value is `{id}.{tag}` where the tag is an HMAC-SHA256 over
//!   the id, keyed by the configured session secret. A value whose tag does
//!   not verify reads as no session at all, so a forged or tampered cookie
//!   never reaches the store

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::session::SESSION_COOKIE;

type HmacSha256 = Hmac<Sha256>;

/// Attributes applied to every session cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub max_age: Duration,
    pub secure: bool,
}

fn sign(id: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(id.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

fn verify(value: &str, secret: &str) -> Option<String> {
    let (id, tag) = value.rsplit_once('.')?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(id.as_bytes());
    let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
    mac.verify_slice(&tag).ok()?;
    Some(id.to_string())
}

/// Build the `Set-Cookie` value binding a signed session id to the browser.
pub fn build_session_cookie(id: &str, secret: &str, opts: CookieOptions) -> HeaderValue {
    let mut cookie = format!(
        "{}={}.{}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        id,
        sign(id, secret),
        opts.max_age.as_secs()
    );
    if opts.secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("session id and fixed attributes are valid header chars")
}

/// Build the `Set-Cookie` value that removes the session cookie.
pub fn build_clear_cookie(secure: bool) -> HeaderValue {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("fixed attributes are valid header chars")
}

/// Extract a verified session id from a request's Cookie header(s).
pub fn session_id_from_headers(headers: &HeaderMap, secret: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
        .find_map(|value| verify(value, secret))
}
