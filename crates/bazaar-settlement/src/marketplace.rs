use std::sync::Arc;

use bazaar_core::{
    MarketplaceStore, PurchaseMode, SettlementResult, Subject, Subscription, SubscriptionRequest,
    WalletOwner, WithdrawalRequest, WithdrawalStatus,
};
use bazaar_ledger::CommissionSummary;
use bazaar_ports::{NotificationSink, PaymentGateway, StatusSink};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::confirmation::{ConfirmOutcome, PaymentConfirmationProcessor};
use crate::lifecycle::{CurrentPlan, RemainingTime, SubscriptionLifecycle};
use crate::outbox::Outbox;
use crate::purchase::{PurchaseDesk, PurchaseReceipt};
use crate::requests::RequestRepository;
use crate::settings::SettlementSettings;
use crate::withdrawals::WithdrawalProcessor;

pub struct Marketplace<TStore, TGateway, TStatus, TNotify>
where
    TStore: MarketplaceStore,
    TGateway: PaymentGateway,
    TStatus: StatusSink,
    TNotify: NotificationSink,
{
    requests: RequestRepository<TStore>,
    purchases: PurchaseDesk<TStore, TGateway>,
    confirmations: PaymentConfirmationProcessor<TStore, TGateway, TStatus, TNotify>,
    withdrawals: WithdrawalProcessor<TStore, TStatus, TNotify>,
    lifecycle: SubscriptionLifecycle<TStore, TStatus, TNotify>,
}

impl<TStore, TGateway, TStatus, TNotify> Marketplace<TStore, TGateway, TStatus, TNotify>
where
    TStore: MarketplaceStore,
    TGateway: PaymentGateway,
    TStatus: StatusSink,
    TNotify: NotificationSink,
{
    pub fn new(
        store: Arc<TStore>,
        gateway: Arc<TGateway>,
        status: Arc<TStatus>,
        notifier: Arc<TNotify>,
        settings: SettlementSettings,
    ) -> Self {
        let outbox = Outbox::new(status, notifier);
        Self {
            requests: RequestRepository::new(Arc::clone(&store)),
            purchases: PurchaseDesk::new(Arc::clone(&store), Arc::clone(&gateway), settings.clone()),
            confirmations: PaymentConfirmationProcessor::new(
                Arc::clone(&store),
                gateway,
                outbox.clone(),
            ),
            withdrawals: WithdrawalProcessor::new(
                Arc::clone(&store),
                outbox.clone(),
                settings.minimum_withdrawal,
                settings.recent_entries,
            ),
            lifecycle: SubscriptionLifecycle::new(
                store,
                outbox,
                settings.renewal_window,
                settings.stale_after,
            ),
        }
    }

    pub async fn create_purchase_request(
        &self,
        subject: Subject,
        plan_id: Uuid,
        mode: PurchaseMode,
    ) -> SettlementResult<PurchaseReceipt> {
        self.purchases.create(subject, plan_id, mode).await
    }

    pub async fn confirm_payment(&self, correlation_id: &str) -> SettlementResult<ConfirmOutcome> {
        self.confirmations.confirm(correlation_id).await
    }

    pub async fn approve_request(
        &self,
        request_id: Uuid,
        note: Option<String>,
    ) -> SettlementResult<ConfirmOutcome> {
        self.confirmations.approve(request_id, note).await
    }

    pub async fn reject_request(
        &self,
        request_id: Uuid,
        note: &str,
    ) -> SettlementResult<SubscriptionRequest> {
        self.confirmations.reject(request_id, note).await
    }

    pub async fn purge_request(&self, request_id: Uuid) -> SettlementResult<SubscriptionRequest> {
        self.requests.purge(request_id).await
    }

    pub async fn get_request_status(&self, subject: Subject) -> SettlementResult<SubscriptionRequest> {
        self.requests.latest_for(subject).await
    }

    pub async fn get_remaining_time(&self, subject: Subject) -> SettlementResult<RemainingTime> {
        self.lifecycle.remaining_time(subject, Utc::now()).await
    }

    pub async fn get_current_plan(&self, subject: Subject) -> SettlementResult<CurrentPlan> {
        self.lifecycle.current_plan(subject, Utc::now()).await
    }

    pub async fn cancel_subscription(&self, subscription_id: Uuid) -> SettlementResult<Subscription> {
        self.lifecycle.cancel(subscription_id).await
    }

    pub async fn set_auto_renew(
        &self,
        subscription_id: Uuid,
        auto_renew: bool,
    ) -> SettlementResult<Subscription> {
        self.lifecycle.set_auto_renew(subscription_id, auto_renew).await
    }

    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> SettlementResult<Vec<Subscription>> {
        self.lifecycle.expire_lapsed(now).await
    }

    pub async fn reconcile_operational_status(
        &self,
        now: DateTime<Utc>,
    ) -> SettlementResult<Vec<Subject>> {
        self.lifecycle.reconcile_operational(now).await
    }

    pub async fn stale_pending(
        &self,
        now: DateTime<Utc>,
    ) -> SettlementResult<Vec<SubscriptionRequest>> {
        self.lifecycle.stale_pending(now).await
    }

    pub async fn reverify_stale(&self, now: DateTime<Utc>) -> SettlementResult<Vec<ConfirmOutcome>> {
        let mut outcomes = Vec::new();
        for request in self.stale_pending(now).await? {
            match self.confirm_payment(&request.correlation_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!("re-verifying request {} failed: {err}", request.id),
            }
        }
        Ok(outcomes)
    }

    pub async fn request_withdrawal(
        &self,
        payee: WalletOwner,
        amount: Decimal,
    ) -> SettlementResult<WithdrawalRequest> {
        self.withdrawals.request(payee, amount).await
    }

    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        note: Option<String>,
    ) -> SettlementResult<WithdrawalRequest> {
        self.withdrawals.approve(withdrawal_id, note).await
    }

    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: Uuid,
        note: &str,
    ) -> SettlementResult<WithdrawalRequest> {
        self.withdrawals.reject(withdrawal_id, note).await
    }

    pub async fn list_withdrawals(
        &self,
        payee: WalletOwner,
        status: Option<WithdrawalStatus>,
    ) -> SettlementResult<Vec<WithdrawalRequest>> {
        self.withdrawals.list(payee, status).await
    }

    pub async fn get_commission_summary(
        &self,
        payee: WalletOwner,
    ) -> SettlementResult<CommissionSummary> {
        self.withdrawals.summary(payee).await
    }
}
