use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::error::StorefrontError;
use crate::pending_orders::{
    ItemsSnapshot, PendingOrderRecord, PendingOrderStatus, PendingOrderStore,
};
use crate::storage::database::{Database, is_unique_violation};
use crate::storage::time::{
    parse_date_string, parse_opt_utc_string, parse_utc_string, to_date_string, to_utc_string,
};

type PendingOrderRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

const PENDING_ORDER_COLUMNS: &str =
    "id, schedule_id, order_id, status, scheduled_for, items_snapshot, confirmed_at, \
     expired_at, created_at";

fn row_to_pending_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingOrderRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn build_pending_order(row: PendingOrderRow) -> Result<PendingOrderRecord, StorefrontError> {
    let (
        id,
        schedule_id,
        order_id,
        status_s,
        scheduled_for_s,
        snapshot_s,
        confirmed_at_s,
        expired_at_s,
        created_at_s,
    ) = row;
    let status = PendingOrderStatus::parse(&status_s).ok_or_else(|| {
        StorefrontError::Data(format!("unknown pending order status `{}`", status_s))
    })?;
    let items_snapshot: ItemsSnapshot = serde_json::from_str(&snapshot_s)?;
    Ok(PendingOrderRecord {
        id,
        schedule_id,
        order_id,
        status,
        scheduled_for: parse_date_string(&scheduled_for_s)?,
        items_snapshot,
        confirmed_at: parse_opt_utc_string(confirmed_at_s)?,
        expired_at: parse_opt_utc_string(expired_at_s)?,
        created_at: parse_utc_string(&created_at_s)?,
    })
}

#[async_trait]
impl PendingOrderStore for Database {
    async fn create_pending_order(
        &self,
        schedule_id: &str,
        scheduled_for: NaiveDate,
        snapshot: &ItemsSnapshot,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError> {
        let now = Utc::now();
        let record = PendingOrderRecord {
            id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.to_string(),
            order_id: None,
            status: PendingOrderStatus::Pending,
            scheduled_for,
            items_snapshot: snapshot.clone(),
            confirmed_at: None,
            expired_at: None,
            created_at: now,
        };

        let conn = self.connection.lock().await;
        let inserted = conn.execute(
            "INSERT INTO pending_orders (id, schedule_id, order_id, status, scheduled_for, \
                 items_snapshot, confirmed_at, expired_at, created_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, NULL, NULL, ?6)",
            rusqlite::params![
                record.id,
                record.schedule_id,
                PendingOrderStatus::Pending.as_str(),
                to_date_string(&scheduled_for),
                serde_json::to_string(snapshot)?,
                to_utc_string(&now),
            ],
        );
        match inserted {
            Ok(_) => Ok(Some(record)),
            // The partial unique index fired: another worker already
            // created the pending order for this cycle.
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_pending_order(
        &self,
        id: &str,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_orders WHERE id = ?1",
                    PENDING_ORDER_COLUMNS
                ),
                [id],
                row_to_pending_order,
            )
            .optional()?;
        row.map(build_pending_order).transpose()
    }

    async fn list_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_orders WHERE schedule_id = ?1 ORDER BY created_at DESC",
            PENDING_ORDER_COLUMNS
        ))?;
        let rows = stmt
            .query_map([schedule_id], row_to_pending_order)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_pending_order).collect()
    }

    async fn replace_snapshot(
        &self,
        id: &str,
        snapshot: &ItemsSnapshot,
    ) -> Result<bool, StorefrontError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE pending_orders SET items_snapshot = ?2 WHERE id = ?1 AND status = ?3",
            rusqlite::params![
                id,
                serde_json::to_string(snapshot)?,
                PendingOrderStatus::Pending.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn claim_pending_for_confirmation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        // Single-statement CAS: of N concurrent confirmers exactly one
        // flips pending -> confirmed and proceeds to charge.
        let claimed = conn.execute(
            "UPDATE pending_orders SET status = ?2, confirmed_at = ?3
             WHERE id = ?1 AND status = ?4",
            rusqlite::params![
                id,
                PendingOrderStatus::Confirmed.as_str(),
                to_utc_string(&now),
                PendingOrderStatus::Pending.as_str(),
            ],
        )?;
        if claimed == 0 {
            return Ok(None);
        }
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_orders WHERE id = ?1",
                    PENDING_ORDER_COLUMNS
                ),
                [id],
                row_to_pending_order,
            )
            .optional()?;
        row.map(build_pending_order).transpose()
    }

    async fn release_confirmation_claim(&self, id: &str) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE pending_orders SET status = ?2, confirmed_at = NULL
             WHERE id = ?1 AND status = ?3 AND order_id IS NULL",
            rusqlite::params![
                id,
                PendingOrderStatus::Pending.as_str(),
                PendingOrderStatus::Confirmed.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn complete_confirmation(
        &self,
        id: &str,
        order_id: &str,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE pending_orders SET order_id = ?2 WHERE id = ?1",
            rusqlite::params![id, order_id],
        )?;
        Ok(())
    }

    async fn mark_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorefrontError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            "UPDATE pending_orders SET status = ?2, expired_at = ?3
             WHERE id = ?1 AND status = ?4",
            rusqlite::params![
                id,
                PendingOrderStatus::Expired.as_str(),
                to_utc_string(&now),
                PendingOrderStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    async fn list_pending_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_orders WHERE schedule_id = ?1 AND status = ?2",
            PENDING_ORDER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![schedule_id, PendingOrderStatus::Pending.as_str()],
                row_to_pending_order,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_pending_order).collect()
    }

    async fn list_pending_scheduled_before(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_orders WHERE status = ?1 AND scheduled_for < ?2",
            PENDING_ORDER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    PendingOrderStatus::Pending.as_str(),
                    to_date_string(&cutoff)
                ],
                row_to_pending_order,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_pending_order).collect()
    }
}
