use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{Rotation, SessionRecord, SessionStore};
use crate::error::StoreError;

/// Process-local session store
///
/// Holds the same conditional-write contract as the Postgres store: the
/// compare and the swap happen under one lock.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SessionRecord>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_session(&self, identity: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.lock()?.get(&identity).cloned())
    }

    async fn find_by_session_id(&self, session_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .find(|record| record.session_id == session_id)
            .map(|record| record.identity))
    }

    async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        if sessions.contains_key(&record.identity) {
            return Err(StoreError::Conflict(format!(
                "session already exists for {}",
                record.identity
            )));
        }
        sessions.insert(record.identity, record);
        Ok(())
    }

    async fn rotate_session(
        &self,
        identity: Uuid,
        expected_session_id: Uuid,
        rotation: Rotation,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.lock()?;
        match sessions.get_mut(&identity) {
            Some(record) if record.session_id == expected_session_id => {
                record.session_id = rotation.new_session_id;
                record.refresh_hash = rotation.new_refresh_hash;
                record.origin_address = rotation.new_origin_address;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
