/// Refresh Secret Hashing and Verification
///
/// Refresh secrets are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with salted bcrypt before storage (never store plaintext)
/// - Compared only through `SecretHasher::verify`, never by equality

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::{ConfigError, TokenError};

pub const MIN_HASH_COST: u32 = 4;
pub const MAX_HASH_COST: u32 = 31;

const REFRESH_SECRET_LENGTH: usize = 64;

/// Generate a new refresh secret
///
/// The secret is returned to the caller once; only its hash is persisted.
pub fn generate_refresh_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// One-way salted hasher for refresh secrets
#[derive(Debug, Clone, Copy)]
pub struct SecretHasher {
    cost: u32,
}

impl SecretHasher {
    /// # Errors
    /// Returns error if `cost` is outside bcrypt's supported range
    pub fn new(cost: u32) -> Result<Self, ConfigError> {
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&cost) {
            return Err(ConfigError::InvalidValue(format!(
                "hash cost {} outside {}..={}",
                cost, MIN_HASH_COST, MAX_HASH_COST
            )));
        }
        Ok(Self { cost })
    }

    /// Hash a secret with a fresh salt
    ///
    /// # Errors
    /// Returns error if bcrypt hashing fails
    pub fn hash(&self, plain: &str) -> Result<String, TokenError> {
        bcrypt::hash(plain, self.cost)
            .map_err(|e| TokenError::Internal(format!("Secret hashing failed: {}", e)))
    }

    /// Check a presented secret against a stored hash
    ///
    /// An unparseable stored hash counts as a mismatch.
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        match bcrypt::verify(plain, hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Stored refresh hash could not be verified: {}", e);
                false
            }
        }
    }
}
