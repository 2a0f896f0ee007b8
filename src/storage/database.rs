use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result as AppResult;

/// SQLite-backed store shared by every domain trait. One connection behind
/// an async mutex; statement-level atomicity plus explicit transactions
/// where a store method writes multiple rows.
#[derive(Clone)]
pub struct Database {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new(database_path: &str) -> AppResult<Self> {
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                stripe_customer_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                revoked_at TEXT
            );

            CREATE TABLE IF NOT EXISTS product_variants (
                id TEXT PRIMARY KEY,
                product_name TEXT NOT NULL,
                variant_name TEXT NOT NULL,
                sku TEXT NOT NULL,
                price TEXT NOT NULL,
                pack_size TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                email TEXT NOT NULL,
                order_number TEXT NOT NULL,
                status TEXT NOT NULL,
                subtotal_amount TEXT NOT NULL,
                vat_amount TEXT NOT NULL,
                shipping_amount TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                payment_reference TEXT NOT NULL UNIQUE,
                reorder_schedule_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                product_variant_id TEXT NOT NULL,
                product_name TEXT NOT NULL,
                variant_name TEXT NOT NULL,
                product_sku TEXT,
                price TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                line_total TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reorder_schedules (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                frequency TEXT NOT NULL,
                status TEXT NOT NULL,
                next_scheduled_date TEXT NOT NULL,
                payment_method_id TEXT NOT NULL,
                card_brand TEXT,
                card_last4 TEXT,
                paused_at TEXT,
                cancelled_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schedules_status_date
                ON reorder_schedules (status, next_scheduled_date);

            CREATE TABLE IF NOT EXISTS reorder_schedule_items (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL,
                product_variant_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                UNIQUE (schedule_id, product_variant_id)
            );

            CREATE TABLE IF NOT EXISTS pending_orders (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL,
                order_id TEXT,
                status TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                items_snapshot TEXT NOT NULL,
                confirmed_at TEXT,
                expired_at TEXT,
                created_at TEXT NOT NULL
            );

            -- One open proposal per cycle; confirmed/expired rows never
            -- block a fresh one for the same date.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_orders_open_cycle
                ON pending_orders (schedule_id, scheduled_for)
                WHERE status = 'pending';

            CREATE INDEX IF NOT EXISTS idx_pending_orders_status_date
                ON pending_orders (status, scheduled_for);",
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

pub(crate) fn parse_money(s: &str) -> AppResult<rust_decimal::Decimal> {
    s.parse()
        .map_err(|e| crate::error::StorefrontError::Data(format!("bad decimal `{}`: {}", s, e)))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
