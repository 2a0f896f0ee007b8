use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::{ChargeOutcome, ChargeRequest, PaymentProcessor};
use crate::error::StorefrontError;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Thin PaymentIntents client. Charges are created `off_session` and
/// confirmed in one call, with the caller's idempotency key forwarded so a
/// retried request reuses the original intent.
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeGateway {
    pub fn from_env() -> Result<Self, StorefrontError> {
        let secret_key = std::env::var("SF_STRIPE_SECRET_KEY")
            .map_err(|_| StorefrontError::Config("missing env `SF_STRIPE_SECRET_KEY`".into()))?;
        Ok(Self::new(secret_key, DEFAULT_BASE_URL.to_string()))
    }

    pub fn new(secret_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            base_url,
        }
    }

    fn minor_units(amount: Decimal) -> Result<i64, StorefrontError> {
        (amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| {
                StorefrontError::Payment(format!("amount out of range: {}", amount))
            })
    }
}

#[async_trait]
impl PaymentProcessor for StripeGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, StorefrontError> {
        let amount = Self::minor_units(request.amount)?;
        let amount_s = amount.to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("amount", amount_s.as_str()),
            ("currency", request.currency.as_str()),
            ("payment_method", request.payment_method_id.as_str()),
            ("description", request.description.as_str()),
            ("off_session", "true"),
            ("confirm", "true"),
        ];
        if let Some(customer) = request.customer_id.as_deref() {
            form.push(("customer", customer));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| StorefrontError::Payment(format!("charge request failed: {}", e)))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StorefrontError::Payment(format!("charge response unreadable: {}", e)))?;

        if status.is_success() {
            let intent_status = body["status"].as_str().unwrap_or_default();
            let payment_id = body["id"].as_str().unwrap_or_default().to_string();
            if intent_status == "succeeded" {
                return Ok(ChargeOutcome::Succeeded { payment_id });
            }
            // requires_action / requires_payment_method etc. cannot complete
            // off-session; treat as a decline the customer must resolve.
            return Ok(ChargeOutcome::Declined {
                message: format!("payment did not complete (status: {})", intent_status),
            });
        }

        let error_type = body["error"]["type"].as_str().unwrap_or_default();
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("payment was not accepted")
            .to_string();
        if error_type == "card_error" {
            Ok(ChargeOutcome::Declined { message })
        } else {
            Err(StorefrontError::Payment(message))
        }
    }

    async fn refund(&self, payment_id: &str) -> Result<(), StorefrontError> {
        let response = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("payment_intent", payment_id)])
            .send()
            .await
            .map_err(|e| StorefrontError::Payment(format!("refund request failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            Err(StorefrontError::Payment(format!(
                "refund rejected: {}",
                body["error"]["message"].as_str().unwrap_or("unknown error")
            )))
        }
    }
}
