use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::error::StorefrontError;
use crate::schedule::{
    CreateSchedulePayload, Frequency, ReorderScheduleRecord, ScheduleItemChange,
    ScheduleItemRecord, ScheduleStatus, ScheduleStore,
};
use crate::storage::database::{Database, parse_money};
use crate::storage::time::{
    parse_date_string, parse_opt_utc_string, parse_utc_string, to_date_string, to_utc_string,
};

type ScheduleRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

const SCHEDULE_COLUMNS: &str = "id, customer_id, frequency, status, next_scheduled_date, \
     payment_method_id, card_brand, card_last4, paused_at, cancelled_at, created_at";

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
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
        row.get(9)?,
        row.get(10)?,
    ))
}

fn build_schedule(row: ScheduleRow) -> Result<ReorderScheduleRecord, StorefrontError> {
    let (
        id,
        customer_id,
        frequency_s,
        status_s,
        next_date_s,
        payment_method_id,
        card_brand,
        card_last4,
        paused_at_s,
        cancelled_at_s,
        created_at_s,
    ) = row;
    let frequency = Frequency::parse(&frequency_s)
        .ok_or_else(|| StorefrontError::Data(format!("unknown frequency `{}`", frequency_s)))?;
    let status = ScheduleStatus::parse(&status_s)
        .ok_or_else(|| StorefrontError::Data(format!("unknown schedule status `{}`", status_s)))?;
    Ok(ReorderScheduleRecord {
        id,
        customer_id,
        frequency,
        status,
        next_scheduled_date: parse_date_string(&next_date_s)?,
        payment_method_id,
        card_brand,
        card_last4,
        paused_at: parse_opt_utc_string(paused_at_s)?,
        cancelled_at: parse_opt_utc_string(cancelled_at_s)?,
        created_at: parse_utc_string(&created_at_s)?,
    })
}

fn items_for(
    conn: &rusqlite::Connection,
    schedule_id: &str,
) -> Result<Vec<ScheduleItemRecord>, StorefrontError> {
    let mut stmt = conn.prepare(
        "SELECT id, schedule_id, product_variant_id, quantity, price
         FROM reorder_schedule_items WHERE schedule_id = ?1 ORDER BY rowid",
    )?;
    let rows: Vec<(String, String, String, i64, String)> = stmt
        .query_map([schedule_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(id, schedule_id, product_variant_id, quantity, price_s)| {
            Ok(ScheduleItemRecord {
                id,
                schedule_id,
                product_variant_id,
                quantity,
                price: parse_money(&price_s)?,
            })
        })
        .collect()
}

#[async_trait]
impl ScheduleStore for Database {
    async fn create_schedule(
        &self,
        payload: CreateSchedulePayload,
    ) -> Result<ReorderScheduleRecord, StorefrontError> {
        let now = Utc::now();
        let schedule_id = Uuid::new_v4().to_string();

        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO reorder_schedules (id, customer_id, frequency, status, \
                 next_scheduled_date, payment_method_id, card_brand, card_last4, \
                 paused_at, cancelled_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, ?9)",
            rusqlite::params![
                schedule_id,
                payload.customer_id,
                payload.frequency.as_str(),
                ScheduleStatus::Active.as_str(),
                to_date_string(&payload.next_scheduled_date),
                payload.payment_method_id,
                payload.card_brand,
                payload.card_last4,
                to_utc_string(&now),
            ],
        )?;
        for item in &payload.items {
            tx.execute(
                "INSERT INTO reorder_schedule_items (id, schedule_id, product_variant_id, \
                     quantity, price)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    schedule_id,
                    item.product_variant_id,
                    item.quantity,
                    item.price.to_string(),
                ],
            )?;
        }
        tx.commit()?;

        Ok(ReorderScheduleRecord {
            id: schedule_id,
            customer_id: payload.customer_id,
            frequency: payload.frequency,
            status: ScheduleStatus::Active,
            next_scheduled_date: payload.next_scheduled_date,
            payment_method_id: payload.payment_method_id,
            card_brand: payload.card_brand,
            card_last4: payload.card_last4,
            paused_at: None,
            cancelled_at: None,
            created_at: now,
        })
    }

    async fn get_schedule(
        &self,
        id: &str,
    ) -> Result<Option<ReorderScheduleRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM reorder_schedules WHERE id = ?1", SCHEDULE_COLUMNS),
                [id],
                row_to_schedule,
            )
            .optional()?;
        row.map(build_schedule).transpose()
    }

    async fn get_schedule_for_customer(
        &self,
        id: &str,
        customer_id: &str,
    ) -> Result<Option<ReorderScheduleRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reorder_schedules WHERE id = ?1 AND customer_id = ?2",
                    SCHEDULE_COLUMNS
                ),
                rusqlite::params![id, customer_id],
                row_to_schedule,
            )
            .optional()?;
        row.map(build_schedule).transpose()
    }

    async fn list_schedules_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ReorderScheduleRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reorder_schedules WHERE customer_id = ?1 ORDER BY created_at DESC",
            SCHEDULE_COLUMNS
        ))?;
        let rows = stmt
            .query_map([customer_id], row_to_schedule)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_schedule).collect()
    }

    async fn list_items(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<ScheduleItemRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        items_for(&conn, schedule_id)
    }

    async fn mark_paused(
        &self,
        id: &str,
        paused_at: DateTime<Utc>,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE reorder_schedules SET status = ?2, paused_at = ?3 WHERE id = ?1",
            rusqlite::params![
                id,
                ScheduleStatus::Paused.as_str(),
                to_utc_string(&paused_at)
            ],
        )?;
        Ok(())
    }

    async fn mark_active(
        &self,
        id: &str,
        next_scheduled_date: NaiveDate,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE reorder_schedules
             SET status = ?2, paused_at = NULL, next_scheduled_date = ?3
             WHERE id = ?1",
            rusqlite::params![
                id,
                ScheduleStatus::Active.as_str(),
                to_date_string(&next_scheduled_date)
            ],
        )?;
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE reorder_schedules SET status = ?2, cancelled_at = ?3 WHERE id = ?1",
            rusqlite::params![
                id,
                ScheduleStatus::Cancelled.as_str(),
                to_utc_string(&cancelled_at)
            ],
        )?;
        Ok(())
    }

    async fn set_next_scheduled_date(
        &self,
        id: &str,
        date: NaiveDate,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE reorder_schedules SET next_scheduled_date = ?2 WHERE id = ?1",
            rusqlite::params![id, to_date_string(&date)],
        )?;
        Ok(())
    }

    async fn set_frequency(
        &self,
        id: &str,
        frequency: Frequency,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE reorder_schedules SET frequency = ?2 WHERE id = ?1",
            rusqlite::params![id, frequency.as_str()],
        )?;
        Ok(())
    }

    async fn apply_item_changes(
        &self,
        schedule_id: &str,
        changes: &[ScheduleItemChange],
        allow_empty: bool,
    ) -> Result<Vec<ScheduleItemRecord>, StorefrontError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;

        for change in changes {
            if change.remove {
                tx.execute(
                    "DELETE FROM reorder_schedule_items
                     WHERE schedule_id = ?1 AND product_variant_id = ?2",
                    rusqlite::params![schedule_id, change.product_variant_id],
                )?;
                continue;
            }

            let quantity = change.quantity.ok_or_else(|| {
                StorefrontError::Validation("quantity is required".to_string())
            })?;
            if quantity <= 0 {
                return Err(StorefrontError::Validation(
                    "quantity must be greater than zero".to_string(),
                ));
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM reorder_schedule_items
                     WHERE schedule_id = ?1 AND product_variant_id = ?2",
                    rusqlite::params![schedule_id, change.product_variant_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(item_id) => {
                    if let Some(price) = change.price {
                        tx.execute(
                            "UPDATE reorder_schedule_items SET quantity = ?2, price = ?3 \
                             WHERE id = ?1",
                            rusqlite::params![item_id, quantity, price.to_string()],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE reorder_schedule_items SET quantity = ?2 WHERE id = ?1",
                            rusqlite::params![item_id, quantity],
                        )?;
                    }
                }
                None => {
                    let price = change.price.ok_or_else(|| {
                        StorefrontError::Validation(format!(
                            "unknown product variant `{}`",
                            change.product_variant_id
                        ))
                    })?;
                    tx.execute(
                        "INSERT INTO reorder_schedule_items (id, schedule_id, \
                             product_variant_id, quantity, price)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            Uuid::new_v4().to_string(),
                            schedule_id,
                            change.product_variant_id,
                            quantity,
                            price.to_string(),
                        ],
                    )?;
                }
            }
        }

        let remaining = items_for(&tx, schedule_id)?;
        if remaining.is_empty() && !allow_empty {
            // Dropping the uncommitted transaction rolls everything back.
            return Err(StorefrontError::Validation(
                "an active schedule must keep at least one item".to_string(),
            ));
        }
        tx.commit()?;
        Ok(remaining)
    }

    async fn list_active_due_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ReorderScheduleRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reorder_schedules
             WHERE status = ?1 AND next_scheduled_date = ?2",
            SCHEDULE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![ScheduleStatus::Active.as_str(), to_date_string(&date)],
                row_to_schedule,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_schedule).collect()
    }
}
