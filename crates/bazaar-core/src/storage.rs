use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    AccountRole, CommissionSplit, LedgerEntry, OwningEntity, Plan, RequestPatch, RequestStatus,
    SalesManager, Salesperson, Subject, Subscription, SubscriptionRequest, SubscriptionStatus,
    WalletBalance, WalletOwner, WithdrawalRequest, WithdrawalStatus,
};

/// Result of a conditional update against a stored state machine field.
#[derive(Debug, Clone)]
pub enum Guarded<T> {
    /// The stored state was in the allowed set; carries the updated record.
    Applied(T),
    /// The stored state was not in the allowed set; carries the record unchanged.
    Stale(T),
    Missing,
}

#[derive(Debug, Clone)]
pub enum OpenRequestInsert {
    Inserted(SubscriptionRequest),
    /// Another request for the same subject is still open.
    Blocked(SubscriptionRequest),
}

#[derive(Debug, Clone)]
pub enum WithdrawalReservation {
    Reserved(WithdrawalRequest),
    Insufficient { available: Decimal },
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserts the request unless the subject already has a request in an open status.
    async fn insert_request(&self, request: SubscriptionRequest)
    -> anyhow::Result<OpenRequestInsert>;
    async fn request(&self, request_id: Uuid) -> anyhow::Result<Option<SubscriptionRequest>>;
    async fn request_by_correlation(
        &self,
        correlation_id: &str,
    ) -> anyhow::Result<Option<SubscriptionRequest>>;
    async fn open_request_for(&self, subject: Subject)
    -> anyhow::Result<Option<SubscriptionRequest>>;
    async fn latest_request_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<SubscriptionRequest>>;
    async fn transition_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        to: RequestStatus,
        patch: RequestPatch,
    ) -> anyhow::Result<Guarded<SubscriptionRequest>>;
    async fn requests_in_status(
        &self,
        status: RequestStatus,
        requested_before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SubscriptionRequest>>;
    async fn delete_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
    ) -> anyhow::Result<Guarded<SubscriptionRequest>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts unless a subscription already exists for `subscription.request_id`.
    /// Returns the stored subscription and whether this call created it.
    async fn insert_subscription_if_absent(
        &self,
        subscription: Subscription,
    ) -> anyhow::Result<(Subscription, bool)>;
    async fn subscription(&self, subscription_id: Uuid) -> anyhow::Result<Option<Subscription>>;
    async fn subscription_for_request(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<Subscription>>;
    /// The active subscription with the latest end for the subject, lapsed or not.
    async fn active_subscription_for(&self, subject: Subject)
    -> anyhow::Result<Option<Subscription>>;
    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> anyhow::Result<Guarded<Subscription>>;
    async fn set_auto_renew(
        &self,
        subscription_id: Uuid,
        auto_renew: bool,
    ) -> anyhow::Result<Option<Subscription>>;
    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subscription>>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// Keyed by (settlement_id, payee); returns the stored split and whether it was created.
    async fn insert_split_if_absent(
        &self,
        split: CommissionSplit,
    ) -> anyhow::Result<(CommissionSplit, bool)>;
    async fn splits_for_settlement(
        &self,
        settlement_id: Uuid,
    ) -> anyhow::Result<Vec<CommissionSplit>>;
    async fn mark_split_paid(&self, split_id: Uuid, paid_at: DateTime<Utc>) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends the credit and adds its amount to the owner's balance, unless an entry for
    /// (settlement_id, owner) already exists. Returns whether the credit was posted.
    async fn post_credit(&self, entry: LedgerEntry) -> anyhow::Result<bool>;
    async fn wallet(&self, owner: WalletOwner) -> anyhow::Result<WalletBalance>;
    async fn entries_for(&self, owner: WalletOwner, limit: usize)
    -> anyhow::Result<Vec<LedgerEntry>>;
    async fn entries_for_settlement(&self, settlement_id: Uuid)
    -> anyhow::Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Reserves `request.amount` against the payee's availability and inserts the request
    /// in one step; nothing is written when the balance does not cover it.
    async fn open_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> anyhow::Result<WithdrawalReservation>;
    async fn withdrawal(&self, withdrawal_id: Uuid) -> anyhow::Result<Option<WithdrawalRequest>>;
    /// Guarded `pending -> to`, releasing the reservation; approval also debits the balance.
    async fn decide_withdrawal(
        &self,
        withdrawal_id: Uuid,
        to: WithdrawalStatus,
        admin_note: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> anyhow::Result<Guarded<WithdrawalRequest>>;
    async fn withdrawals_for(
        &self,
        owner: WalletOwner,
        status: Option<WithdrawalStatus>,
    ) -> anyhow::Result<Vec<WithdrawalRequest>>;
}

/// Read access to records owned by the surrounding marketplace (plans, subject owners,
/// the sales hierarchy).
#[async_trait]
pub trait Directory: Send + Sync {
    async fn plan(&self, plan_id: Uuid) -> anyhow::Result<Option<Plan>>;
    async fn owning_entity(&self, subject: Subject) -> anyhow::Result<Option<OwningEntity>>;
    async fn salesperson(&self, user_id: Uuid) -> anyhow::Result<Option<Salesperson>>;
    async fn sales_manager(&self, user_id: Uuid) -> anyhow::Result<Option<SalesManager>>;
    async fn account_role(&self, user_id: Uuid) -> anyhow::Result<Option<AccountRole>>;
}

/// The operational flag on a subject's owning record. Both writes only touch owners that
/// are not already active.
#[async_trait]
pub trait OperationalStatusStore: Send + Sync {
    async fn mark_operational(&self, subject: Subject) -> anyhow::Result<bool>;
    /// Activates every owner holding an unexpired active subscription; returns the subjects
    /// that changed.
    async fn reconcile_operational(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subject>>;
}

pub trait MarketplaceStore:
    RequestStore
    + SubscriptionStore
    + CommissionStore
    + LedgerStore
    + WithdrawalStore
    + OperationalStatusStore
    + Directory
{
}

impl<T> MarketplaceStore for T where
    T: RequestStore
        + SubscriptionStore
        + CommissionStore
        + LedgerStore
        + WithdrawalStore
        + OperationalStatusStore
        + Directory
{
}
