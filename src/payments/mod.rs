pub mod stripe;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::StorefrontError;

/// A single off-session charge against a stored payment method.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: Option<String>,
    pub payment_method_id: String,
    pub description: String,
    /// Retries with the same key must not double-charge; the materializer
    /// derives it from the pending order id.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { payment_id: String },
    /// The processor answered and said no (card declined, expired, etc).
    Declined { message: String },
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Transport or processor-side errors surface as
    /// `StorefrontError::Payment`; a decline is a normal outcome.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, StorefrontError>;

    /// Best-effort compensation when persistence fails after a successful
    /// charge.
    async fn refund(&self, payment_id: &str) -> Result<(), StorefrontError>;
}
