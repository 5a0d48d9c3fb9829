/// JWT Claims structure
///
/// Payload of an access token. Every field is typed, so a token whose
/// payload is missing a field or carries the wrong type fails to decode
/// as a whole instead of being picked apart key by key.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Session id of the generation this token belongs to
    pub jti: Uuid,
    /// Subject (user identity)
    pub sub: Uuid,
    /// Origin address the session is bound to
    pub ip: IpAddr,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims for a session generation
    ///
    /// # Arguments
    /// * `session_id` - Session id of the new generation
    /// * `identity` - User identity
    /// * `origin` - Origin address to bind
    /// * `ttl_seconds` - Token expiration in seconds from now
    /// * `issuer` - Issuer identifier
    pub fn new(
        session_id: Uuid,
        identity: Uuid,
        origin: IpAddr,
        ttl_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            jti: session_id,
            sub: identity,
            ip: origin,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
            iss: issuer,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.jti
    }

    pub fn identity(&self) -> Uuid {
        self.sub
    }

    pub fn origin(&self) -> IpAddr {
        self.ip
    }

    /// Whether the session may still be refreshed with this token
    pub fn within_refresh_window(&self, window_seconds: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.iat.saturating_add(window_seconds) > now
    }
}
