use std::time::Duration;

use evesync_core::CharacterId;

/// Secrets and lifetime handed back by a successful token grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
    pub scope: Option<String>,
}

/// Introspection result for an access token.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedIdentity {
    pub character_id: Option<CharacterId>,
    pub payload: serde_json::Value,
}
