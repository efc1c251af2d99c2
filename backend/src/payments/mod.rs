use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

mod checkout;
#[cfg(test)]
pub mod fake;

pub use checkout::HostedCheckoutClient;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error reported by the provider. `message` is shown to the user as-is.
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Payment provider unreachable: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `open`, `complete` or `expired`.
    #[serde(default)]
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn is_expired(&self) -> bool {
        self.status.as_deref() == Some("expired")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub amount: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferReceipt {
    pub id: String,
    pub amount: i64,
}

/// Hosted checkout, refund and payout API of the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;

    async fn create_refund(&self, payment_intent: &str, amount_minor: i64) -> Result<RefundReceipt, GatewayError>;

    async fn create_transfer(
        &self,
        destination: &str,
        amount_minor: i64,
        currency: &str,
        transfer_group: &str,
    ) -> Result<TransferReceipt, GatewayError>;

    async fn reverse_transfer(&self, transfer_id: &str, amount_minor: i64) -> Result<TransferReceipt, GatewayError>;
}
