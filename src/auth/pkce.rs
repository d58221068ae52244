//! PKCE parameter generation (RFC 7636, S256 method).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Transient per-login protocol state. Stored in the session between the
/// authorization redirect and the callback; write-once, read-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceState {
    /// Code verifier the token endpoint must see again.
    pub verifier: String,

    /// Anti-CSRF state echoed back by the issuer.
    pub state: String,
}

impl PkceState {
    pub fn new() -> Self {
        Self {
            verifier: generate_verifier(),
            state: generate_state(),
        }
    }
}

impl Default for PkceState {
    fn default() -> Self {
        Self::new()
    }
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 16 random bytes, URL-safe base64 without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// challenge = b64url(sha256(ascii(verifier))), no padding.
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
