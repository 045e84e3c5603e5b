use async_trait::async_trait;
use bazaar_core::{SettlementEvent, Subject, WalletOwner};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub amount: Decimal,
    pub currency: String,
    pub correlation_id: String,
    pub success_url: String,
    pub failure_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPaymentStatus {
    pub outcome: GatewayOutcome,
    pub payer_phone: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(String),
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway returned an unreadable response: {0}")]
    Malformed(String),
    #[error("payment gateway rejected the call with {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Outbound payment provider. Callers treat any error as "state unknown" and
/// leave local records untouched.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a collection and returns the URL the payer completes it at.
    async fn initiate(&self, initiation: &PaymentInitiation) -> Result<String, GatewayError>;
    async fn status(
        &self,
        currency: &str,
        correlation_id: &str,
    ) -> Result<GatewayPaymentStatus, GatewayError>;
}

/// Outbox for settlement events. Delivery is at-least-once.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn emit(&self, event: &SettlementEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum Audience {
    Subject(Subject),
    Payee(WalletOwner),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub audience: Audience,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(audience: Audience, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            audience,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
