use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StorefrontError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOrderStatus {
    Pending,
    Confirmed,
    Expired,
}

impl PendingOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingOrderStatus::Pending => "pending",
            PendingOrderStatus::Confirmed => "confirmed",
            PendingOrderStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PendingOrderStatus::Pending),
            "confirmed" => Some(PendingOrderStatus::Confirmed),
            "expired" => Some(PendingOrderStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PendingOrderStatus::Confirmed | PendingOrderStatus::Expired
        )
    }
}

/// One orderable line of a snapshot. Prices are frozen at snapshot time;
/// nothing here re-reads the schedule or the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub product_variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub price: Decimal,
    pub line_total: Decimal,
    pub available: bool,
}

/// A schedule line that could not be carried into the order. Kept for
/// display; excluded from totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableItem {
    pub product_variant_id: Option<String>,
    pub product_name: String,
    pub variant_name: String,
    pub reason: String,
}

/// The self-contained record of what a pending order contains. This is the
/// sole source of truth for the proposal: the customer sees these prices
/// even if the catalog changes before they act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsSnapshot {
    pub items: Vec<SnapshotItem>,
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub unavailable_items: Vec<UnavailableItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingOrderRecord {
    pub id: String,
    pub schedule_id: String,
    pub order_id: Option<String>,
    pub status: PendingOrderStatus,
    pub scheduled_for: NaiveDate,
    pub items_snapshot: ItemsSnapshot,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PendingOrderStore: Send + Sync {
    /// Inserts a new pending order for a cycle. Returns `None` when a
    /// pending row already exists for the same (schedule, scheduled_for);
    /// the partial unique index makes concurrent sweep workers safe.
    async fn create_pending_order(
        &self,
        schedule_id: &str,
        scheduled_for: NaiveDate,
        snapshot: &ItemsSnapshot,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError>;

    async fn get_pending_order(
        &self,
        id: &str,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError>;

    async fn list_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError>;

    /// Replaces the snapshot of a still-pending order. Returns `false`
    /// (and writes nothing) once the order has left `pending`.
    async fn replace_snapshot(
        &self,
        id: &str,
        snapshot: &ItemsSnapshot,
    ) -> Result<bool, StorefrontError>;

    /// Single-statement compare-and-swap `pending -> confirmed`. Exactly one
    /// of any number of concurrent callers gets the record back; the rest
    /// see `None` and must answer "already processed" without charging.
    async fn claim_pending_for_confirmation(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingOrderRecord>, StorefrontError>;

    /// Reverts a claim after a failed charge so the confirm link can be
    /// retried. Only applies while no order has been attached.
    async fn release_confirmation_claim(&self, id: &str) -> Result<(), StorefrontError>;

    /// Links the materialized order to a claimed pending order.
    async fn complete_confirmation(
        &self,
        id: &str,
        order_id: &str,
    ) -> Result<(), StorefrontError>;

    /// `pending -> expired`; a no-op returning `false` if the order already
    /// reached a terminal status.
    async fn mark_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorefrontError>;

    async fn list_pending_for_schedule(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError>;

    /// Pending orders whose `scheduled_for` lies strictly before `cutoff`;
    /// the expiry sweep's work list.
    async fn list_pending_scheduled_before(
        &self,
        cutoff: NaiveDate,
    ) -> Result<Vec<PendingOrderRecord>, StorefrontError>;
}
