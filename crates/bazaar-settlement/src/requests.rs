use std::sync::Arc;

use bazaar_core::{
    Guarded, MarketplaceStore, OpenRequestInsert, PaymentStatus, Plan, PurchaseMode, RequestPatch,
    RequestStatus, SettlementError, SettlementResult, Subject, SubscriptionRequest,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns every write to `SubscriptionRequest.status`. Writes are guarded against the
/// set of states the caller expects the record to still be in.
pub struct RequestRepository<TStore: ?Sized> {
    store: Arc<TStore>,
}

impl<TStore: ?Sized> Clone for RequestRepository<TStore> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<TStore> RequestRepository<TStore>
where
    TStore: MarketplaceStore + ?Sized,
{
    pub fn new(store: Arc<TStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        subject: Subject,
        plan: &Plan,
        mode: PurchaseMode,
    ) -> SettlementResult<SubscriptionRequest> {
        let now = Utc::now();
        let current = self.store.active_subscription_for(subject).await?;
        if let Some(current) = current.filter(|subscription| subscription.is_current(now)) {
            return Err(SettlementError::conflict(format!(
                "{} {} already holds an active subscription until {}",
                subject.kind.as_str(),
                subject.id,
                current.ends_at
            )));
        }

        let request = SubscriptionRequest {
            id: Uuid::new_v4(),
            subject,
            plan_id: plan.id,
            amount: plan.price,
            currency: plan.currency.clone(),
            correlation_id: Uuid::new_v4().simple().to_string(),
            mode,
            status: mode.initial_status(),
            payment_status: PaymentStatus::Pending,
            collect_url: None,
            failure_reason: None,
            admin_note: None,
            requested_at: now,
            paid_at: None,
            processed_at: None,
        };

        match self.store.insert_request(request).await? {
            OpenRequestInsert::Inserted(request) => {
                info!(
                    "subscription request {} opened for {} {} ({})",
                    request.id,
                    subject.kind.as_str(),
                    subject.id,
                    request.status.as_str()
                );
                Ok(request)
            }
            OpenRequestInsert::Blocked(open) => Err(SettlementError::conflict(format!(
                "request {} is still {} for this subject",
                open.id,
                open.status.as_str()
            ))),
        }
    }

    pub async fn get(&self, request_id: Uuid) -> SettlementResult<SubscriptionRequest> {
        self.store
            .request(request_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("subscription request", request_id))
    }

    pub async fn by_correlation(&self, correlation_id: &str) -> SettlementResult<SubscriptionRequest> {
        self.store
            .request_by_correlation(correlation_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("correlation id", correlation_id))
    }

    pub async fn guarded(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        to: RequestStatus,
        patch: RequestPatch,
    ) -> SettlementResult<Guarded<SubscriptionRequest>> {
        let outcome = self
            .store
            .transition_request(request_id, from, to, patch)
            .await?;
        match &outcome {
            Guarded::Applied(request) => {
                info!("request {} moved to {}", request.id, to.as_str());
            }
            Guarded::Stale(request) => {
                warn!(
                    "request {} is {}, refusing move to {}",
                    request.id,
                    request.status.as_str(),
                    to.as_str()
                );
            }
            Guarded::Missing => {}
        }
        Ok(outcome)
    }

    pub async fn transition(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        to: RequestStatus,
        patch: RequestPatch,
    ) -> SettlementResult<SubscriptionRequest> {
        match self.guarded(request_id, from, to, patch).await? {
            Guarded::Applied(request) => Ok(request),
            Guarded::Stale(request) => Err(SettlementError::conflict(format!(
                "request {} is {}, cannot move to {}",
                request.id,
                request.status.as_str(),
                to.as_str()
            ))),
            Guarded::Missing => Err(SettlementError::not_found("subscription request", request_id)),
        }
    }

    pub async fn purge(&self, request_id: Uuid) -> SettlementResult<SubscriptionRequest> {
        let closed = [RequestStatus::Approved, RequestStatus::Rejected];
        match self.store.delete_request(request_id, &closed).await? {
            Guarded::Applied(request) => {
                info!("request {} purged", request.id);
                Ok(request)
            }
            Guarded::Stale(request) => Err(SettlementError::conflict(format!(
                "only approved or rejected requests can be deleted, request {} is {}",
                request.id,
                request.status.as_str()
            ))),
            Guarded::Missing => Err(SettlementError::not_found("subscription request", request_id)),
        }
    }

    pub async fn latest_for(&self, subject: Subject) -> SettlementResult<SubscriptionRequest> {
        self.store.latest_request_for(subject).await?.ok_or_else(|| {
            SettlementError::not_found("subscription request for subject", subject.id)
        })
    }
}
