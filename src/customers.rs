use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::StorefrontError;

#[derive(Debug, Clone)]
pub struct CustomerRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerPayload {
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CustomerRecord, StorefrontError>;

    async fn get_customer(&self, id: &str) -> Result<Option<CustomerRecord>, StorefrontError>;

    async fn get_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerRecord>, StorefrontError>;
}

pub fn hash_password(password: &str) -> Result<String, StorefrontError> {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StorefrontError::Config(format!("password hash failed: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
