use std::net::IpAddr;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Rotation, SessionRecord, SessionStore};
use crate::error::StoreError;

/// Postgres-backed session store
///
/// Expects the `sessions` table from `migrations/`.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_origin(raw: &str) -> Result<IpAddr, StoreError> {
    raw.parse::<IpAddr>()
        .map_err(|e| StoreError::Corrupt(format!("origin address {:?}: {}", raw, e)))
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_session(&self, identity: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT session_id, refresh_hash, origin_address
            FROM sessions
            WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((session_id, refresh_hash, origin_address)) => Ok(Some(SessionRecord {
                identity,
                session_id,
                refresh_hash,
                origin_address: parse_origin(&origin_address)?,
            })),
        }
    }

    async fn find_by_session_id(&self, session_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let identity = sqlx::query_scalar::<_, Uuid>(
            "SELECT identity FROM sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        // Unique violations surface as StoreError::Conflict
        sqlx::query(
            r#"
            INSERT INTO sessions (identity, session_id, refresh_hash, origin_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, now(), now())
            "#,
        )
        .bind(record.identity)
        .bind(record.session_id)
        .bind(&record.refresh_hash)
        .bind(record.origin_address.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rotate_session(
        &self,
        identity: Uuid,
        expected_session_id: Uuid,
        rotation: Rotation,
    ) -> Result<bool, StoreError> {
        // A single conditional UPDATE: Postgres re-checks the predicate
        // against the latest row version, so only one racer can match.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET session_id = $3, refresh_hash = $4, origin_address = $5, updated_at = now()
            WHERE identity = $1 AND session_id = $2
            "#,
        )
        .bind(identity)
        .bind(expected_session_id)
        .bind(rotation.new_session_id)
        .bind(&rotation.new_refresh_hash)
        .bind(rotation.new_origin_address.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin() {
        assert_eq!(parse_origin("10.0.0.1").unwrap(), "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(parse_origin("::1").unwrap(), "::1".parse::<IpAddr>().unwrap());
        assert!(matches!(parse_origin("10.0.0.1:8080"), Err(StoreError::Corrupt(_))));
    }
}
