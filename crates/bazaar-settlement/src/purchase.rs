use std::sync::Arc;

use bazaar_core::{
    Guarded, MarketplaceStore, PaymentStatus, PurchaseMode, RequestPatch, RequestStatus,
    SettlementError, SettlementResult, Subject, SubscriptionRequest,
};
use bazaar_ports::{PaymentGateway, PaymentInitiation};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::requests::RequestRepository;
use crate::settings::SettlementSettings;

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub request: SubscriptionRequest,
    pub collect_url: Option<String>,
}

pub struct PurchaseDesk<TStore: ?Sized, TGateway: ?Sized> {
    store: Arc<TStore>,
    gateway: Arc<TGateway>,
    requests: RequestRepository<TStore>,
    settings: SettlementSettings,
}

impl<TStore, TGateway> PurchaseDesk<TStore, TGateway>
where
    TStore: MarketplaceStore + ?Sized,
    TGateway: PaymentGateway + ?Sized,
{
    pub fn new(store: Arc<TStore>, gateway: Arc<TGateway>, settings: SettlementSettings) -> Self {
        Self {
            requests: RequestRepository::new(Arc::clone(&store)),
            store,
            gateway,
            settings,
        }
    }

    pub async fn create(
        &self,
        subject: Subject,
        plan_id: Uuid,
        mode: PurchaseMode,
    ) -> SettlementResult<PurchaseReceipt> {
        if self.store.owning_entity(subject).await?.is_none() {
            return Err(SettlementError::not_found(subject.kind.as_str(), subject.id));
        }
        let plan = self
            .store
            .plan(plan_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("plan", plan_id))?;
        if !plan.active {
            return Err(SettlementError::validation(format!("plan {} is not on sale", plan.id)));
        }
        if plan.price <= Decimal::ZERO {
            return Err(SettlementError::validation(format!("plan {} has no price", plan.id)));
        }
        if !plan.currency.eq_ignore_ascii_case(&self.settings.currency) {
            return Err(SettlementError::validation(format!(
                "plan {} is priced in {}, settlement runs in {}",
                plan.id, plan.currency, self.settings.currency
            )));
        }

        let request = self.requests.create(subject, &plan, mode).await?;
        if mode == PurchaseMode::Manual {
            return Ok(PurchaseReceipt {
                request,
                collect_url: None,
            });
        }

        let initiation = PaymentInitiation {
            amount: request.amount,
            currency: request.currency.clone(),
            correlation_id: request.correlation_id.clone(),
            success_url: self.settings.success_url.clone(),
            failure_url: self.settings.failure_url.clone(),
        };

        match self.gateway.initiate(&initiation).await {
            Ok(collect_url) => {
                let request = match self
                    .requests
                    .guarded(
                        request.id,
                        &[RequestStatus::PendingPayment],
                        RequestStatus::PendingPayment,
                        RequestPatch {
                            collect_url: Some(collect_url.clone()),
                            ..RequestPatch::default()
                        },
                    )
                    .await?
                {
                    // A callback may settle the request before the collect url is stored.
                    Guarded::Applied(request) | Guarded::Stale(request) => request,
                    Guarded::Missing => {
                        return Err(SettlementError::not_found("subscription request", request.id));
                    }
                };
                info!("payment {} initiated for request {}", request.correlation_id, request.id);
                Ok(PurchaseReceipt {
                    request,
                    collect_url: Some(collect_url),
                })
            }
            Err(err) => {
                warn!("payment initiation for request {} failed: {err}", request.id);
                self.requests
                    .transition(
                        request.id,
                        &[RequestStatus::PendingPayment],
                        RequestStatus::Failed,
                        RequestPatch {
                            payment_status: Some(PaymentStatus::Failed),
                            failure_reason: Some(err.to_string()),
                            processed_at: Some(Utc::now()),
                            ..RequestPatch::default()
                        },
                    )
                    .await?;
                Err(SettlementError::Upstream(err.to_string()))
            }
        }
    }
}
