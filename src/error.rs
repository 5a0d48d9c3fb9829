/// Error Handling Module
///
/// Unified error handling for the token service.
/// It covers:
/// 1. Domain-specific error types (token lifecycle, store, notification, config)
/// 2. The application error type used by the HTTP layer
/// 3. HTTP response mapping with structured logging
/// 4. Error context enrichment

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Failures of the token lifecycle (issue, verify, rotate)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature on a presented token or wrong refresh secret
    #[error("invalid credential")]
    InvalidCredential,

    /// Presented origin address differs from the bound one
    #[error("origin address does not match the bound session")]
    OriginMismatch,

    /// Token belongs to a superseded session generation
    #[error("session generation has been superseded")]
    StaleSession,

    /// Lost the optimistic race on rotation
    #[error("session was rotated concurrently")]
    ConcurrentRotation,

    /// Store timed out or failed at the transport level
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed claims: {0}")]
    MalformedClaims(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Failures that are reported to clients as a generic "unauthorized"
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            TokenError::InvalidCredential
                | TokenError::OriginMismatch
                | TokenError::StaleSession
                | TokenError::ConcurrentRotation
                | TokenError::MalformedClaims(_)
                | TokenError::InvalidSignature
                | TokenError::Expired
        )
    }
}

/// Session store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call exceeded its deadline")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record for this identity or session id already exists
    #[error("conflicting session record: {0}")]
    Conflict(String),

    /// A stored row could not be decoded into a session record
    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }

        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
                StoreError::Corrupt(e.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for TokenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => TokenError::ConcurrentRotation,
            other => TokenError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Anomaly notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to deliver notification: {0}")]
    SendFailed(String),

    #[error("notification service rejected the alert: {0}")]
    Rejected(String),

    #[error("notification timed out")]
    Timeout,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    MissingRequired(String),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type returned by HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

const UNAUTHORIZED_MESSAGE: &str = "Authentication failed";

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            // Every rejected credential looks the same from outside
            AppError::Token(e) if e.is_unauthorized() => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                UNAUTHORIZED_MESSAGE.to_string(),
            ),
            AppError::Token(TokenError::StoreUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Session store temporarily unavailable".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),
            AppError::Token(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Token(e) if e.is_unauthorized() => {
                // The specific reason is only ever visible in logs
                tracing::warn!(request_id = request_id, error = %e, "Credential rejected");
            }
            AppError::Token(TokenError::StoreUnavailable(msg)) => {
                tracing::error!(request_id = request_id, error = %msg, "Session store unavailable");
            }
            AppError::BadRequest(msg) => {
                tracing::info!(request_id = request_id, error = %msg, "Bad request");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Token(_) | AppError::Internal(_) => {
                tracing::error!(request_id = request_id, error = %self, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Token(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            AppError::Token(TokenError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Token(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for request-scoped logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub identity: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            identity: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_identity(mut self, identity: impl ToString) -> Self {
        self.identity = Some(identity.to_string());
        self
    }
}
