/// Authentication Routes
///
/// Issue, refresh and inspect sessions. The origin address always comes
/// from the connection (see `OriginPolicy`), never from the request body.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Claims, TokenManager, TokenPair};
use crate::error::{AppError, ErrorContext};
use crate::origin::OriginPolicy;

/// Session issuance request
#[derive(Deserialize)]
pub struct AuthRequest {
    pub identity: Uuid,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_secret,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Current session information
#[derive(Serialize, Deserialize)]
pub struct SessionResponse {
    pub identity: Uuid,
    pub session_id: Uuid,
    pub expires_at: String,
}

/// POST /v1/auth
///
/// Issue a credential pair for an identity from the caller's origin.
///
/// # Errors
/// - 401: Session is bound to a different origin address
/// - 503: Session store unavailable
pub async fn authenticate(
    req: HttpRequest,
    form: web::Json<AuthRequest>,
    manager: web::Data<TokenManager>,
    policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("authenticate").with_identity(form.identity);
    let origin = policy.resolve(&req)?;

    let pair = manager
        .authenticate(form.identity, origin)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        identity = %form.identity,
        "Credentials issued"
    );

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, manager.access_token_ttl())))
}

/// POST /v1/refresh
///
/// Rotate the session into a new generation. The presented pair is
/// unusable afterwards.
///
/// # Errors
/// - 401: Invalid, superseded, concurrently rotated or foreign-origin credentials
/// - 503: Session store unavailable
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    manager: web::Data<TokenManager>,
    policy: web::Data<OriginPolicy>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let origin = policy.resolve(&req)?;

    let pair = manager
        .refresh(&form.access_token, &form.refresh_token, origin)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        "Credentials refreshed"
    );

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, manager.access_token_ttl())))
}

/// GET /v1/me
///
/// **Requires a live access token** in the Authorization header; claims
/// are injected by `JwtMiddleware`.
pub async fn current_session(claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| AppError::Internal("token expiry out of range".to_string()))?;

    Ok(HttpResponse::Ok().json(SessionResponse {
        identity: claims.sub,
        session_id: claims.jti,
        expires_at: expires_at.to_rfc3339(),
    }))
}
