mod auth;
mod health_check;

pub use auth::{authenticate, current_session, refresh};
pub use auth::{AuthRequest, AuthResponse, RefreshRequest, SessionResponse};
pub use health_check::health_check;
