use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StorefrontError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    EveryWeek,
    EveryTwoWeeks,
    EveryMonth,
    #[serde(rename = "every_3_months")]
    Every3Months,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::EveryWeek => "every_week",
            Frequency::EveryTwoWeeks => "every_two_weeks",
            Frequency::EveryMonth => "every_month",
            Frequency::Every3Months => "every_3_months",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "every_week" => Some(Frequency::EveryWeek),
            "every_two_weeks" => Some(Frequency::EveryTwoWeeks),
            "every_month" => Some(Frequency::EveryMonth),
            "every_3_months" => Some(Frequency::Every3Months),
            _ => None,
        }
    }

    pub fn all() -> &'static [Frequency] {
        &[
            Frequency::EveryWeek,
            Frequency::EveryTwoWeeks,
            Frequency::EveryMonth,
            Frequency::Every3Months,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ScheduleStatus::Active),
            "paused" => Some(ScheduleStatus::Paused),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    Asap,
    OriginalSchedule,
}

impl ResumeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asap" => Some(ResumeMode::Asap),
            "original_schedule" => Some(ResumeMode::OriginalSchedule),
            _ => None,
        }
    }
}

impl Default for ResumeMode {
    fn default() -> Self {
        ResumeMode::Asap
    }
}

/// One delivery interval after `from`. Month-based frequencies follow
/// calendar addition, clamping to the last day of shorter months.
pub fn next_date(frequency: Frequency, from: NaiveDate) -> NaiveDate {
    match frequency {
        Frequency::EveryWeek => from + Duration::days(7),
        Frequency::EveryTwoWeeks => from + Duration::days(14),
        Frequency::EveryMonth => from + Months::new(1),
        Frequency::Every3Months => from + Months::new(3),
    }
}

/// New delivery date for a schedule coming out of pause.
///
/// `asap` restarts the clock from today. `original_schedule` walks the old
/// cadence forward until it lands past today; a date already in the future
/// still advances one interval, so resuming always skips the cycle that
/// was paused over.
pub fn resume_date(
    frequency: Frequency,
    current_next: NaiveDate,
    today: NaiveDate,
    mode: ResumeMode,
) -> NaiveDate {
    match mode {
        ResumeMode::Asap => next_date(frequency, today),
        ResumeMode::OriginalSchedule => {
            let mut date = next_date(frequency, current_next);
            while date <= today {
                date = next_date(frequency, date);
            }
            date
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    Pause,
    Resume,
    Cancel,
    SkipNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Persist the new status.
    Apply(ScheduleStatus),
    /// Legal but nothing to change (e.g. pausing an already-paused schedule).
    Noop,
}

/// The schedule state machine. Every (status, event) pair is decided here;
/// handlers act on the outcome instead of scattering status checks.
pub fn transition(
    status: ScheduleStatus,
    event: ScheduleEvent,
) -> Result<Transition, StorefrontError> {
    use ScheduleEvent::*;
    use ScheduleStatus::*;

    match (status, event) {
        (Active, Pause) => Ok(Transition::Apply(Paused)),
        (Paused, Pause) => Ok(Transition::Noop),
        (Paused, Resume) => Ok(Transition::Apply(Active)),
        (Active, Resume) => Ok(Transition::Noop),
        (Active | Paused, Cancel) => Ok(Transition::Apply(Cancelled)),
        (Cancelled, Cancel) => Ok(Transition::Noop),
        // Skipping does not change status, only the delivery date.
        (Active, SkipNext) => Ok(Transition::Apply(Active)),
        (Paused | Cancelled, SkipNext) => Err(StorefrontError::Validation(format!(
            "cannot skip delivery for a {} schedule",
            status.as_str()
        ))),
        (Cancelled, Pause | Resume) => Err(StorefrontError::Validation(
            "schedule has been cancelled".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReorderScheduleRecord {
    pub id: String,
    pub customer_id: String,
    pub frequency: Frequency,
    pub status: ScheduleStatus,
    pub next_scheduled_date: NaiveDate,
    pub payment_method_id: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleItemRecord {
    pub id: String,
    pub schedule_id: String,
    pub product_variant_id: String,
    pub quantity: i64,
    /// Unit price remembered from when the item was added; snapshots are
    /// re-priced from the live catalog, this is display/reference only.
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewScheduleItem {
    pub product_variant_id: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateSchedulePayload {
    pub customer_id: String,
    pub frequency: Frequency,
    pub next_scheduled_date: NaiveDate,
    pub payment_method_id: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub items: Vec<NewScheduleItem>,
}

/// One line of a nested item update. `remove` wins over `quantity`;
/// a change for a variant not yet on the schedule inserts it.
#[derive(Debug, Clone)]
pub struct ScheduleItemChange {
    pub product_variant_id: String,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub remove: bool,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(
        &self,
        payload: CreateSchedulePayload,
    ) -> Result<ReorderScheduleRecord, StorefrontError>;

    async fn get_schedule(&self, id: &str)
        -> Result<Option<ReorderScheduleRecord>, StorefrontError>;

    /// Ownership-scoped lookup; `None` for both a missing schedule and a
    /// schedule owned by someone else.
    async fn get_schedule_for_customer(
        &self,
        id: &str,
        customer_id: &str,
    ) -> Result<Option<ReorderScheduleRecord>, StorefrontError>;

    async fn list_schedules_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ReorderScheduleRecord>, StorefrontError>;

    async fn list_items(
        &self,
        schedule_id: &str,
    ) -> Result<Vec<ScheduleItemRecord>, StorefrontError>;

    async fn mark_paused(
        &self,
        id: &str,
        paused_at: DateTime<Utc>,
    ) -> Result<(), StorefrontError>;

    /// Reactivates a paused schedule: clears `paused_at` and adopts the
    /// recomputed delivery date.
    async fn mark_active(
        &self,
        id: &str,
        next_scheduled_date: NaiveDate,
    ) -> Result<(), StorefrontError>;

    async fn mark_cancelled(
        &self,
        id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StorefrontError>;

    async fn set_next_scheduled_date(
        &self,
        id: &str,
        date: NaiveDate,
    ) -> Result<(), StorefrontError>;

    async fn set_frequency(&self, id: &str, frequency: Frequency)
        -> Result<(), StorefrontError>;

    /// Applies inserts, re-quantifies and removals in one transaction.
    /// Unless `allow_empty`, rejects a change set that would leave the
    /// schedule without items.
    async fn apply_item_changes(
        &self,
        schedule_id: &str,
        changes: &[ScheduleItemChange],
        allow_empty: bool,
    ) -> Result<Vec<ScheduleItemRecord>, StorefrontError>;

    async fn list_active_due_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ReorderScheduleRecord>, StorefrontError>;
}
