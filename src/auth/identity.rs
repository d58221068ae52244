//! Trusted identity produced by a completed login.

use serde::{Deserialize, Serialize};

/// A server-verified identity. Never built from client-supplied headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier from the identity provider.
    pub id: String,

    /// Email address, empty when the provider did not share one.
    #[serde(default)]
    pub email: String,

    /// Human-readable name for display.
    pub display_name: String,

    /// Organizational domain claim, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_domain: Option<String>,
}
