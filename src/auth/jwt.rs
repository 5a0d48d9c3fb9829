/// Claims Codec
///
/// Issues and verifies HS512-signed access tokens. The signing key is a
/// single server-held secret supplied through configuration.

use std::net::IpAddr;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::error::TokenError;

const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Clone)]
pub struct ClaimsCodec {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    issuer: String,
}

impl ClaimsCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            issuer: issuer.into(),
        }
    }

    /// Sign a fresh access token for a session generation
    ///
    /// # Errors
    /// Returns `TokenError::Internal` if encoding fails
    pub fn issue(
        &self,
        session_id: Uuid,
        identity: Uuid,
        origin: IpAddr,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(session_id, identity, origin, ttl_seconds, self.issuer.clone());

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, issuer, structure and expiry
    ///
    /// # Errors
    /// `InvalidSignature`, `MalformedClaims` or `Expired`
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, self.validation(true))
    }

    /// Same as [`verify`](Self::verify) but accepts a correctly signed token
    /// past its expiry. Used on refresh, where the session id is needed as a
    /// lookup key even after the access token lapsed.
    pub fn verify_allow_expired(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, self.validation(false))
    }

    fn validation(&self, check_expiry: bool) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = check_expiry;
        validation
    }

    fn decode_with(&self, token: &str, validation: Validation) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidIssuer => TokenError::InvalidSignature,
                    _ => TokenError::MalformedClaims(e.to_string()),
                }
            })
    }
}
