/// Session Store Adapter
///
/// Typed contract over the persistent session store. One record per
/// identity; every field but the identity is replaced on rotation, and
/// every write is all-or-nothing.

mod memory;
mod postgres;

use std::net::IpAddr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

/// Persisted state of a user's single active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub identity: Uuid,
    pub session_id: Uuid,
    pub refresh_hash: String,
    pub origin_address: IpAddr,
}

/// Replacement values written by a rotation
#[derive(Debug, Clone)]
pub struct Rotation {
    pub new_session_id: Uuid,
    pub new_refresh_hash: String,
    pub new_origin_address: IpAddr,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session record bound to an identity
    async fn find_session(&self, identity: Uuid) -> Result<Option<SessionRecord>, StoreError>;

    /// Resolve the identity currently holding `session_id`
    ///
    /// Returns `None` once the session id has been rotated out.
    async fn find_by_session_id(&self, session_id: Uuid) -> Result<Option<Uuid>, StoreError>;

    /// First-time issuance
    ///
    /// # Errors
    /// `StoreError::Conflict` if a record already exists for the identity
    async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Conditionally replace the record of `identity`
    ///
    /// The write happens only if the stored session id still equals
    /// `expected_session_id`, observed and written as one atomic unit.
    /// Returns `Ok(false)` when the condition no longer holds.
    async fn rotate_session(
        &self,
        identity: Uuid,
        expected_session_id: Uuid,
        rotation: Rotation,
    ) -> Result<bool, StoreError>;
}
