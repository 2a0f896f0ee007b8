use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorefrontError;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub customer_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: SessionRecord) -> Result<(), StorefrontError>;

    /// Resolves a token hash to a live session: unexpired and unrevoked
    /// as of `now`.
    async fn get_live_session_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StorefrontError>;

    async fn revoke_session(
        &self,
        token_hash: &str,
        when: DateTime<Utc>,
    ) -> Result<bool, StorefrontError>;
}

pub fn session_ttl_secs() -> i64 {
    std::env::var("SF_SESSION_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30 * 24 * 60 * 60)
}

pub fn issue_session_token() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64_URL_SAFE_NO_PAD;
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    B64_URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_session_token(token: &str) -> String {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
