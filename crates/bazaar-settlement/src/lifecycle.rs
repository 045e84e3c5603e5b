use std::sync::Arc;

use bazaar_core::{
    Guarded, MarketplaceStore, Plan, PurchaseMode, RequestStatus, SettlementError, SettlementEvent,
    SettlementEventKind, SettlementResult, Subject, Subscription, SubscriptionRequest,
    SubscriptionStatus,
};
use bazaar_ports::{Audience, Notification, NotificationSink, StatusSink};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::outbox::Outbox;

#[derive(Debug, Clone, Serialize)]
pub struct RemainingTime {
    pub subject: Subject,
    pub subscription_id: Option<Uuid>,
    pub ends_at: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
    pub remaining_days: i64,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalEligibility {
    pub eligible: bool,
    pub open_request_id: Option<Uuid>,
    pub ends_within_window: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlan {
    pub subject: Subject,
    pub subscription: Option<Subscription>,
    pub plan: Option<Plan>,
    pub renewal: RenewalEligibility,
}

pub struct SubscriptionLifecycle<TStore: ?Sized, TStatus: ?Sized, TNotify: ?Sized> {
    store: Arc<TStore>,
    outbox: Outbox<TStatus, TNotify>,
    renewal_window: Duration,
    stale_after: Duration,
}

impl<TStore, TStatus, TNotify> SubscriptionLifecycle<TStore, TStatus, TNotify>
where
    TStore: MarketplaceStore + ?Sized,
    TStatus: StatusSink + ?Sized,
    TNotify: NotificationSink + ?Sized,
{
    pub fn new(
        store: Arc<TStore>,
        outbox: Outbox<TStatus, TNotify>,
        renewal_window: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            outbox,
            renewal_window,
            stale_after,
        }
    }

    pub async fn remaining_time(
        &self,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> SettlementResult<RemainingTime> {
        let subscription = self.store.active_subscription_for(subject).await?;
        let remaining = subscription
            .as_ref()
            .map(|subscription| subscription.remaining(now))
            .unwrap_or_else(Duration::zero);

        Ok(RemainingTime {
            subject,
            subscription_id: subscription.as_ref().map(|subscription| subscription.id),
            ends_at: subscription.as_ref().map(|subscription| subscription.ends_at),
            remaining_seconds: remaining.num_seconds(),
            remaining_days: remaining.num_days(),
            expired: remaining <= Duration::zero(),
        })
    }

    pub async fn current_plan(
        &self,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> SettlementResult<CurrentPlan> {
        let subscription = self
            .store
            .active_subscription_for(subject)
            .await?
            .filter(|subscription| subscription.is_current(now));
        let plan = match &subscription {
            Some(subscription) => self.store.plan(subscription.plan_id).await?,
            None => None,
        };
        let open_request = self.store.open_request_for(subject).await?;

        let ends_within_window = subscription
            .as_ref()
            .is_some_and(|subscription| subscription.ends_at - now <= self.renewal_window);

        Ok(CurrentPlan {
            subject,
            renewal: RenewalEligibility {
                eligible: subscription.is_none() && open_request.is_none(),
                open_request_id: open_request.map(|request| request.id),
                ends_within_window,
            },
            subscription,
            plan,
        })
    }

    pub async fn cancel(&self, subscription_id: Uuid) -> SettlementResult<Subscription> {
        let subscription = match self
            .store
            .transition_subscription(
                subscription_id,
                &[SubscriptionStatus::Active],
                SubscriptionStatus::Cancelled,
            )
            .await?
        {
            Guarded::Applied(subscription) => subscription,
            Guarded::Stale(current) => {
                return Err(SettlementError::conflict(format!(
                    "subscription {} is already {}",
                    current.id,
                    current.status.as_str()
                )));
            }
            Guarded::Missing => {
                return Err(SettlementError::not_found("subscription", subscription_id));
            }
        };

        info!("subscription {} cancelled", subscription.id);
        self.outbox
            .emit(SettlementEvent::new(
                SettlementEventKind::SubscriptionCancelled,
                Some(subscription.subject),
                subscription.id,
                json!({ "ends_at": subscription.ends_at }),
            ))
            .await;
        self.outbox
            .notify(Notification::new(
                Audience::Subject(subscription.subject),
                "Subscription cancelled",
                "Your subscription has been cancelled.",
            ))
            .await;
        Ok(subscription)
    }

    pub async fn set_auto_renew(
        &self,
        subscription_id: Uuid,
        auto_renew: bool,
    ) -> SettlementResult<Subscription> {
        self.store
            .set_auto_renew(subscription_id, auto_renew)
            .await?
            .ok_or_else(|| SettlementError::not_found("subscription", subscription_id))
    }

    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> SettlementResult<Vec<Subscription>> {
        let mut expired = Vec::new();
        for lapsed in self.store.lapsed_subscriptions(now).await? {
            let Guarded::Applied(subscription) = self
                .store
                .transition_subscription(
                    lapsed.id,
                    &[SubscriptionStatus::Active],
                    SubscriptionStatus::Expired,
                )
                .await?
            else {
                continue;
            };

            info!("subscription {} expired", subscription.id);
            self.outbox
                .emit(SettlementEvent::new(
                    SettlementEventKind::SubscriptionExpired,
                    Some(subscription.subject),
                    subscription.id,
                    json!({ "ends_at": subscription.ends_at }),
                ))
                .await;
            self.outbox
                .notify(Notification::new(
                    Audience::Subject(subscription.subject),
                    "Subscription expired",
                    "Your subscription has expired. Renew to keep access.",
                ))
                .await;
            expired.push(subscription);
        }
        Ok(expired)
    }

    /// Re-derives operational status from current subscriptions, covering activations
    /// whose published event never reached a subscriber.
    pub async fn reconcile_operational(&self, now: DateTime<Utc>) -> SettlementResult<Vec<Subject>> {
        let activated = self.store.reconcile_operational(now).await?;
        for subject in &activated {
            info!(
                "{} {} activated from its current subscription",
                subject.kind.as_str(),
                subject.id
            );
        }
        Ok(activated)
    }

    pub async fn stale_pending(
        &self,
        now: DateTime<Utc>,
    ) -> SettlementResult<Vec<SubscriptionRequest>> {
        let requests = self
            .store
            .requests_in_status(RequestStatus::PendingPayment, now - self.stale_after)
            .await?;
        Ok(requests
            .into_iter()
            .filter(|request| request.mode == PurchaseMode::Gateway)
            .collect())
    }
}
