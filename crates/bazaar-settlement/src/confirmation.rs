use std::sync::Arc;

use bazaar_commission::{CommissionPolicy, resolve_policy, split};
use bazaar_core::{
    Guarded, MarketplaceStore, PaymentStatus, Plan, PurchaseMode, RequestPatch, RequestStatus,
    SettlementError, SettlementEvent, SettlementEventKind, SettlementResult, Subject, Subscription,
    SubscriptionRequest, SubscriptionStatus,
};
use bazaar_ledger::post_settlement;
use bazaar_ports::{
    Audience, GatewayOutcome, Notification, NotificationSink, PaymentGateway, StatusSink,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::outbox::Outbox;
use crate::requests::RequestRepository;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Activated {
        request: SubscriptionRequest,
        subscription: Subscription,
    },
    AlreadyProcessed { request: SubscriptionRequest },
    Failed { request: SubscriptionRequest },
    StillPending { request: SubscriptionRequest },
}

impl ConfirmOutcome {
    pub fn request(&self) -> &SubscriptionRequest {
        match self {
            Self::Activated { request, .. }
            | Self::AlreadyProcessed { request }
            | Self::Failed { request }
            | Self::StillPending { request } => request,
        }
    }
}

pub struct PaymentConfirmationProcessor<TStore: ?Sized, TGateway: ?Sized, TStatus: ?Sized, TNotify: ?Sized> {
    store: Arc<TStore>,
    gateway: Arc<TGateway>,
    requests: RequestRepository<TStore>,
    outbox: Outbox<TStatus, TNotify>,
}

impl<TStore, TGateway, TStatus, TNotify> PaymentConfirmationProcessor<TStore, TGateway, TStatus, TNotify>
where
    TStore: MarketplaceStore + ?Sized,
    TGateway: PaymentGateway + ?Sized,
    TStatus: StatusSink + ?Sized,
    TNotify: NotificationSink + ?Sized,
{
    pub fn new(
        store: Arc<TStore>,
        gateway: Arc<TGateway>,
        outbox: Outbox<TStatus, TNotify>,
    ) -> Self {
        Self {
            requests: RequestRepository::new(Arc::clone(&store)),
            store,
            gateway,
            outbox,
        }
    }

    /// Replays are absorbed by the request guard, the per-request subscription and the
    /// per-payee ledger keys, so a retry after a partial failure only redoes the tail.
    pub async fn confirm(&self, correlation_id: &str) -> SettlementResult<ConfirmOutcome> {
        let correlation_id = correlation_id.trim();
        if correlation_id.is_empty() {
            return Err(SettlementError::validation("correlation id is required"));
        }

        let request = self.requests.by_correlation(correlation_id).await?;
        if request.is_settled() {
            info!("request {} already settled, skipping", request.id);
            return Ok(ConfirmOutcome::AlreadyProcessed { request });
        }
        match request.status {
            RequestStatus::Failed => return Ok(ConfirmOutcome::Failed { request }),
            RequestStatus::PendingPayment => {}
            other => {
                return Err(SettlementError::conflict(format!(
                    "request {} is {} and settles through admin review",
                    request.id,
                    other.as_str()
                )));
            }
        }
        if request.mode == PurchaseMode::Manual {
            return Err(SettlementError::conflict(format!(
                "request {} is a manual request",
                request.id
            )));
        }

        let status = self
            .gateway
            .status(&request.currency, &request.correlation_id)
            .await
            .map_err(|err| {
                warn!(
                    "gateway status for {} unavailable, leaving request pending: {err}",
                    request.correlation_id
                );
                SettlementError::Upstream(err.to_string())
            })?;

        match status.outcome {
            GatewayOutcome::Pending => Ok(ConfirmOutcome::StillPending { request }),
            GatewayOutcome::Failed => self.fail(request).await,
            GatewayOutcome::Success => {
                self.settle(request, RequestStatus::PendingPayment, RequestStatus::Active, None)
                    .await
            }
        }
    }

    pub async fn approve(
        &self,
        request_id: Uuid,
        note: Option<String>,
    ) -> SettlementResult<ConfirmOutcome> {
        let request = self.requests.get(request_id).await?;
        match request.status {
            RequestStatus::Approved => Ok(ConfirmOutcome::AlreadyProcessed { request }),
            RequestStatus::Pending => {
                self.settle(request, RequestStatus::Pending, RequestStatus::Approved, note)
                    .await
            }
            other => Err(SettlementError::conflict(format!(
                "request {} is {}, only pending requests can be approved",
                request.id,
                other.as_str()
            ))),
        }
    }

    pub async fn reject(&self, request_id: Uuid, note: &str) -> SettlementResult<SubscriptionRequest> {
        let note = note.trim();
        if note.is_empty() {
            return Err(SettlementError::validation("a rejection note is required"));
        }

        let request = self
            .requests
            .transition(
                request_id,
                &[RequestStatus::Pending],
                RequestStatus::Rejected,
                RequestPatch {
                    admin_note: Some(note.to_string()),
                    processed_at: Some(Utc::now()),
                    ..RequestPatch::default()
                },
            )
            .await?;

        self.outbox
            .notify(Notification::new(
                Audience::Subject(request.subject),
                "Subscription request rejected",
                format!("Your subscription request was rejected: {note}"),
            ))
            .await;
        Ok(request)
    }

    async fn fail(&self, request: SubscriptionRequest) -> SettlementResult<ConfirmOutcome> {
        let patch = RequestPatch {
            payment_status: Some(PaymentStatus::Failed),
            failure_reason: Some("payment gateway reported failure".to_string()),
            processed_at: Some(Utc::now()),
            ..RequestPatch::default()
        };

        let request = match self
            .requests
            .guarded(request.id, &[RequestStatus::PendingPayment], RequestStatus::Failed, patch)
            .await?
        {
            Guarded::Applied(request) => request,
            Guarded::Stale(current) if current.is_settled() => {
                return Ok(ConfirmOutcome::AlreadyProcessed { request: current });
            }
            Guarded::Stale(current) if current.status == RequestStatus::Failed => {
                return Ok(ConfirmOutcome::Failed { request: current });
            }
            Guarded::Stale(current) => {
                return Err(SettlementError::conflict(format!(
                    "request {} moved to {} concurrently",
                    current.id,
                    current.status.as_str()
                )));
            }
            Guarded::Missing => {
                return Err(SettlementError::not_found("subscription request", request.id));
            }
        };

        self.outbox
            .emit(SettlementEvent::new(
                SettlementEventKind::PaymentFailed,
                Some(request.subject),
                request.id,
                json!({ "correlation_id": request.correlation_id }),
            ))
            .await;
        self.outbox
            .notify(Notification::new(
                Audience::Subject(request.subject),
                "Payment failed",
                "Your subscription payment did not go through.",
            ))
            .await;

        Ok(ConfirmOutcome::Failed { request })
    }

    async fn settle(
        &self,
        request: SubscriptionRequest,
        from: RequestStatus,
        to: RequestStatus,
        note: Option<String>,
    ) -> SettlementResult<ConfirmOutcome> {
        let plan = self
            .store
            .plan(request.plan_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("plan", request.plan_id))?;

        let now = Utc::now();
        let subscription = self.pinned_subscription(&request, &plan, now).await?;

        self.outbox
            .emit(SettlementEvent::new(
                SettlementEventKind::SubscriptionActivated,
                Some(request.subject),
                subscription.id,
                json!({
                    "request_id": request.id,
                    "plan_id": plan.id,
                    "ends_at": subscription.ends_at,
                }),
            ))
            .await;

        let report =
            post_settlement(self.store.as_ref(), subscription.id, &subscription.split_plan).await?;

        for share in report.newly_credited() {
            self.outbox
                .emit(SettlementEvent::new(
                    SettlementEventKind::CommissionCredited,
                    Some(request.subject),
                    subscription.id,
                    json!({ "payee": share.payee, "amount": share.amount }),
                ))
                .await;
        }

        let patch = RequestPatch {
            payment_status: Some(PaymentStatus::Success),
            admin_note: note,
            paid_at: Some(now),
            processed_at: Some(now),
            ..RequestPatch::default()
        };
        let request = match self.requests.guarded(request.id, &[from], to, patch).await? {
            Guarded::Applied(request) => request,
            Guarded::Stale(current) if current.status == to => {
                return Ok(ConfirmOutcome::AlreadyProcessed { request: current });
            }
            Guarded::Stale(current) => {
                return Err(SettlementError::conflict(format!(
                    "request {} moved to {} during settlement",
                    current.id,
                    current.status.as_str()
                )));
            }
            Guarded::Missing => {
                return Err(SettlementError::not_found("subscription request", request.id));
            }
        };

        for share in report.newly_credited() {
            self.outbox
                .notify(Notification::new(
                    Audience::Payee(share.payee),
                    "Commission credited",
                    format!("{} {} was credited to your wallet.", share.amount, request.currency),
                ))
                .await;
        }
        self.outbox
            .notify(Notification::new(
                Audience::Subject(request.subject),
                "Subscription active",
                format!("Your {} plan is active until {}.", plan.name, subscription.ends_at),
            ))
            .await;

        Ok(ConfirmOutcome::Activated {
            request,
            subscription,
        })
    }

    /// The subscription of a request carries the split resolved on the first attempt;
    /// retries post that split and never consult the directory again.
    async fn pinned_subscription(
        &self,
        request: &SubscriptionRequest,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> SettlementResult<Subscription> {
        if let Some(existing) = self.store.subscription_for_request(request.id).await? {
            info!(
                "resuming settlement of request {} on subscription {}",
                request.id, existing.id
            );
            return Ok(existing);
        }

        let ends_at = plan.duration.end_from(now).ok_or_else(|| {
            SettlementError::Internal(format!("plan {} end date is out of range", plan.id))
        })?;
        let policy = self.policy_for(request.subject).await?;
        let (subscription, created) = self
            .store
            .insert_subscription_if_absent(Subscription {
                id: Uuid::new_v4(),
                request_id: request.id,
                subject: request.subject,
                plan_id: plan.id,
                starts_at: now,
                ends_at,
                status: SubscriptionStatus::Active,
                auto_renew: false,
                split_plan: split(policy, request.amount),
                created_at: now,
            })
            .await?;
        if created {
            info!(
                "subscription {} created for request {} until {} under {}",
                subscription.id,
                request.id,
                subscription.ends_at,
                subscription.split_plan.policy.name()
            );
        } else {
            info!(
                "request {} was settled concurrently on subscription {}",
                request.id, subscription.id
            );
        }
        Ok(subscription)
    }

    async fn policy_for(&self, subject: Subject) -> SettlementResult<CommissionPolicy> {
        match self.store.owning_entity(subject).await? {
            Some(entity) => Ok(resolve_policy(self.store.as_ref(), &entity).await?),
            None => {
                warn!(
                    "no owning entity for {} {}, settling to admin",
                    subject.kind.as_str(),
                    subject.id
                );
                Ok(CommissionPolicy::Unresolved {
                    reason: "owning entity not found".to_string(),
                })
            }
        }
    }
}
