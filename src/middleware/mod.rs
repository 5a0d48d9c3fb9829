/// Middleware module
///
/// Custom middleware for access-token protected routes.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
