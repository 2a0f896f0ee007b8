use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::customers::{CustomerRecord, CustomerStore};
use crate::error::StorefrontError;
use crate::storage::database::{Database, is_unique_violation};
use crate::storage::time::{parse_utc_string, to_utc_string};

fn row_to_customer(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(String, String, String, Option<String>, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn build_customer(
    (id, email, password_hash, stripe_customer_id, created_at_s): (
        String,
        String,
        String,
        Option<String>,
        String,
    ),
) -> Result<CustomerRecord, StorefrontError> {
    Ok(CustomerRecord {
        id,
        email,
        password_hash,
        stripe_customer_id,
        created_at: parse_utc_string(&created_at_s)?,
    })
}

#[async_trait]
impl CustomerStore for Database {
    async fn create_customer(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CustomerRecord, StorefrontError> {
        let now = Utc::now();
        let record = CustomerRecord {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            stripe_customer_id: None,
            created_at: now,
        };

        let conn = self.connection.lock().await;
        let inserted = conn.execute(
            "INSERT INTO customers (id, email, password_hash, stripe_customer_id, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            rusqlite::params![record.id, record.email, record.password_hash, to_utc_string(&now)],
        );
        match inserted {
            Ok(_) => Ok(record),
            Err(e) if is_unique_violation(&e) => Err(StorefrontError::Validation(
                "an account with this email already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_customer(&self, id: &str) -> Result<Option<CustomerRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                "SELECT id, email, password_hash, stripe_customer_id, created_at
                 FROM customers WHERE id = ?1",
                [id],
                row_to_customer,
            )
            .optional()?;
        row.map(build_customer).transpose()
    }

    async fn get_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                "SELECT id, email, password_hash, stripe_customer_id, created_at
                 FROM customers WHERE email = ?1",
                [email.trim().to_lowercase()],
                row_to_customer,
            )
            .optional()?;
        row.map(build_customer).transpose()
    }
}
