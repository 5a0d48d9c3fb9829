/// Authentication module
///
/// Claims codec, refresh-secret hashing, origin anomaly detection and the
/// token lifecycle manager that ties them together.

mod anomaly;
mod claims;
mod jwt;
mod manager;
mod secret;

pub use anomaly::AnomalyGuard;
pub use claims::Claims;
pub use jwt::ClaimsCodec;
pub use manager::{TokenManager, TokenPair};
pub use secret::generate_refresh_secret;
pub use secret::SecretHasher;
pub use secret::{MAX_HASH_COST, MIN_HASH_COST};
