use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::error::StorefrontError;
use crate::sessions::{SessionRecord, SessionStore};
use crate::storage::database::Database;
use crate::storage::time::{parse_opt_utc_string, parse_utc_string, to_utc_string};

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, session: SessionRecord) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, customer_id, token_hash, created_at, expires_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            rusqlite::params![
                session.id,
                session.customer_id,
                session.token_hash,
                to_utc_string(&session.created_at),
                to_utc_string(&session.expires_at),
            ],
        )?;
        Ok(())
    }

    async fn get_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row: Option<(String, String, String, String, String, Option<String>)> = conn
            .query_row(
                "SELECT id, customer_id, token_hash, created_at, expires_at, revoked_at
                 FROM sessions WHERE token_hash = ?1",
                [token_hash],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, customer_id, token_hash, created_at_s, expires_at_s, revoked_at_s)) = row
        else {
            return Ok(None);
        };

        let record = SessionRecord {
            id,
            customer_id,
            token_hash,
            created_at: parse_utc_string(&created_at_s)?,
            expires_at: parse_utc_string(&expires_at_s)?,
            revoked_at: parse_opt_utc_string(revoked_at_s)?,
        };
        if record.revoked_at.is_some() || record.expires_at <= now {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn revoke_session(
        &self,
        token_hash: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorefrontError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE sessions SET revoked_at = ?2 WHERE token_hash = ?1 AND revoked_at IS NULL",
            rusqlite::params![token_hash, to_utc_string(&when)],
        )?;
        Ok(changed > 0)
    }
}
