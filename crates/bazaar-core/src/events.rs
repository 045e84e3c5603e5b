use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Subject;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementEventKind {
    SubscriptionActivated,
    SubscriptionCancelled,
    SubscriptionExpired,
    PaymentFailed,
    CommissionCredited,
    WithdrawalRequested,
    WithdrawalDecided,
}

/// Outbox record emitted by the settlement core. Consumers apply the cross-aggregate
/// side effects (operational status, notifications) and must tolerate redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub id: Uuid,
    pub kind: SettlementEventKind,
    pub subject: Option<Subject>,
    pub reference_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl SettlementEvent {
    pub fn new(
        kind: SettlementEventKind,
        subject: Option<Subject>,
        reference_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            subject,
            reference_id,
            occurred_at: Utc::now(),
            payload,
        }
    }
}
