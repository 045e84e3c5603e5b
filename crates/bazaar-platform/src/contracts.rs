use bazaar_core::{
    PayeeRole, PaymentStatus, PurchaseMode, RequestStatus, SubjectKind, SubscriptionRequest,
    WalletOwner, WithdrawalStatus,
};
use bazaar_settlement::{ConfirmOutcome, PurchaseReceipt};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub subject_kind: SubjectKind,
    pub subject_id: Uuid,
    pub plan_id: Uuid,
    #[serde(default)]
    pub mode: PurchaseMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseResponse {
    pub request_id: Uuid,
    pub correlation_id: String,
    pub status: RequestStatus,
    pub amount: Decimal,
    pub currency: String,
    pub collect_url: Option<String>,
}

impl From<PurchaseReceipt> for CreatePurchaseResponse {
    fn from(receipt: PurchaseReceipt) -> Self {
        Self {
            request_id: receipt.request.id,
            correlation_id: receipt.request.correlation_id,
            status: receipt.request.status,
            amount: receipt.request.amount,
            currency: receipt.request.currency,
            collect_url: receipt.collect_url,
        }
    }
}

/// Provider callback body. Only the reference is read; the outcome is always
/// re-queried from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCallback {
    #[serde(alias = "reference", alias = "transaction_ref")]
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPaymentResponse {
    pub outcome: String,
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub payment_status: PaymentStatus,
    pub subscription_id: Option<Uuid>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl From<&ConfirmOutcome> for ConfirmPaymentResponse {
    fn from(outcome: &ConfirmOutcome) -> Self {
        let (label, subscription) = match outcome {
            ConfirmOutcome::Activated { subscription, .. } => ("activated", Some(subscription)),
            ConfirmOutcome::AlreadyProcessed { .. } => ("already_processed", None),
            ConfirmOutcome::Failed { .. } => ("failed", None),
            ConfirmOutcome::StillPending { .. } => ("still_pending", None),
        };
        let request = outcome.request();

        Self {
            outcome: label.to_string(),
            request_id: request.id,
            status: request.status,
            payment_status: request.payment_status,
            subscription_id: subscription.map(|subscription| subscription.id),
            ends_at: subscription.map(|subscription| subscription.ends_at),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatusResponse {
    pub request_id: Uuid,
    pub plan_id: Uuid,
    pub mode: PurchaseMode,
    pub status: RequestStatus,
    pub payment_status: PaymentStatus,
    pub collect_url: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionRequest> for RequestStatusResponse {
    fn from(request: SubscriptionRequest) -> Self {
        Self {
            request_id: request.id,
            plan_id: request.plan_id,
            mode: request.mode,
            status: request.status,
            payment_status: request.payment_status,
            collect_url: request.collect_url,
            failure_reason: request.failure_reason,
            admin_note: request.admin_note,
            requested_at: request.requested_at,
            paid_at: request.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRenewRequest {
    pub auto_renew: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub payee_role: PayeeRole,
    pub payee_id: Option<Uuid>,
    pub amount: Decimal,
}

impl CreateWithdrawalRequest {
    pub fn payee(&self) -> Option<WalletOwner> {
        payee_from(self.payee_role, self.payee_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalListQuery {
    pub payee_role: PayeeRole,
    pub payee_id: Option<Uuid>,
    pub status: Option<WithdrawalStatus>,
}

impl WithdrawalListQuery {
    pub fn payee(&self) -> Option<WalletOwner> {
        payee_from(self.payee_role, self.payee_id)
    }
}

/// Salespeople and managers need an id; the admin wallet never has one.
pub fn payee_from(role: PayeeRole, id: Option<Uuid>) -> Option<WalletOwner> {
    match (role, id) {
        (PayeeRole::Admin, _) => Some(WalletOwner::Admin),
        (role, Some(id)) => Some(WalletOwner::from_parts(role, id)),
        (_, None) => None,
    }
}
