use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use bazaar_core::{
    ErrorKind, PayeeRole, SettlementError, Subject, SubjectKind, Subscription, WithdrawalRequest,
};
use bazaar_ledger::CommissionSummary;
use bazaar_platform::{
    AutoRenewRequest, ConfirmPaymentResponse, CreatePurchaseRequest, CreatePurchaseResponse,
    CreateWithdrawalRequest, GatewayConfig, HttpPaymentGateway, PaymentCallback, RedisBus,
    RedisNotificationSink, RedisStatusSink, RequestStatusResponse, ReviewRequest, ServiceConfig,
    WithdrawalListQuery, apply_schema, connect_database, payee_from,
    settlement_settings_from_env,
};
use bazaar_settlement::{CurrentPlan, Marketplace, RemainingTime};
use bazaar_store::PgStore;
use tracing::{error, info};
use uuid::Uuid;

type SettlementMarketplace =
    Marketplace<PgStore, HttpPaymentGateway, RedisStatusSink, RedisNotificationSink>;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
struct AppState {
    marketplace: Arc<SettlementMarketplace>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bazaar_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let gateway_config = GatewayConfig::from_env()?;
    let settings = settlement_settings_from_env()?;

    let pool = connect_database(&config.database_url).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let marketplace = Marketplace::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(HttpPaymentGateway::new(&gateway_config)?),
        Arc::new(RedisStatusSink::new(redis.clone())),
        Arc::new(RedisNotificationSink::new(redis)),
        settings,
    );
    let state = AppState {
        marketplace: Arc::new(marketplace),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/subscriptions/requests", post(create_purchase_request))
        .route("/payments/callback", post(payment_callback))
        .route(
            "/subscriptions/requests/verify/{correlation_id}",
            post(verify_payment),
        )
        .route(
            "/subscriptions/requests/{request_id}/approve",
            post(approve_request),
        )
        .route(
            "/subscriptions/requests/{request_id}/reject",
            post(reject_request),
        )
        .route(
            "/subscriptions/requests/{request_id}",
            axum::routing::delete(purge_request),
        )
        .route(
            "/subjects/{kind}/{subject_id}/request-status",
            get(request_status),
        )
        .route(
            "/subjects/{kind}/{subject_id}/remaining-time",
            get(remaining_time),
        )
        .route(
            "/subjects/{kind}/{subject_id}/subscription",
            get(current_plan),
        )
        .route(
            "/subscriptions/{subscription_id}/cancel",
            post(cancel_subscription),
        )
        .route(
            "/subscriptions/{subscription_id}/auto-renew",
            post(set_auto_renew),
        )
        .route(
            "/withdrawals",
            get(list_withdrawals).post(request_withdrawal),
        )
        .route(
            "/withdrawals/{withdrawal_id}/approve",
            post(approve_withdrawal),
        )
        .route(
            "/withdrawals/{withdrawal_id}/reject",
            post(reject_withdrawal),
        )
        .route(
            "/payees/{role}/{payee_id}/commission-summary",
            get(commission_summary),
        )
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("settlement gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_purchase_request(
    State(state): State<AppState>,
    Json(payload): Json<CreatePurchaseRequest>,
) -> ApiResult<CreatePurchaseResponse> {
    let subject = Subject::new(payload.subject_kind, payload.subject_id);
    let receipt = state
        .marketplace
        .create_purchase_request(subject, payload.plan_id, payload.mode)
        .await
        .map_err(settlement_error)?;

    Ok(Json(receipt.into()))
}

async fn payment_callback(
    State(state): State<AppState>,
    Json(payload): Json<PaymentCallback>,
) -> ApiResult<ConfirmPaymentResponse> {
    confirm(&state, &payload.correlation_id).await
}

async fn verify_payment(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> ApiResult<ConfirmPaymentResponse> {
    confirm(&state, &correlation_id).await
}

async fn confirm(state: &AppState, correlation_id: &str) -> ApiResult<ConfirmPaymentResponse> {
    let outcome = state
        .marketplace
        .confirm_payment(correlation_id)
        .await
        .map_err(settlement_error)?;

    Ok(Json(ConfirmPaymentResponse::from(&outcome)))
}

async fn approve_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<ReviewRequest>>,
) -> ApiResult<ConfirmPaymentResponse> {
    let note = payload.and_then(|Json(review)| review.note);
    let outcome = state
        .marketplace
        .approve_request(request_id, note)
        .await
        .map_err(settlement_error)?;

    Ok(Json(ConfirmPaymentResponse::from(&outcome)))
}

async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<RequestStatusResponse> {
    let request = state
        .marketplace
        .reject_request(request_id, payload.note.as_deref().unwrap_or_default())
        .await
        .map_err(settlement_error)?;

    Ok(Json(request.into()))
}

async fn purge_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .marketplace
        .purge_request(request_id)
        .await
        .map_err(settlement_error)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn request_status(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, Uuid)>,
) -> ApiResult<RequestStatusResponse> {
    let subject = parse_subject(&kind, subject_id)?;
    let request = state
        .marketplace
        .get_request_status(subject)
        .await
        .map_err(settlement_error)?;

    Ok(Json(request.into()))
}

async fn remaining_time(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, Uuid)>,
) -> ApiResult<RemainingTime> {
    let subject = parse_subject(&kind, subject_id)?;
    let remaining = state
        .marketplace
        .get_remaining_time(subject)
        .await
        .map_err(settlement_error)?;

    Ok(Json(remaining))
}

async fn current_plan(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, Uuid)>,
) -> ApiResult<CurrentPlan> {
    let subject = parse_subject(&kind, subject_id)?;
    let current = state
        .marketplace
        .get_current_plan(subject)
        .await
        .map_err(settlement_error)?;

    Ok(Json(current))
}

async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Subscription> {
    let subscription = state
        .marketplace
        .cancel_subscription(subscription_id)
        .await
        .map_err(settlement_error)?;

    Ok(Json(subscription))
}

async fn set_auto_renew(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<AutoRenewRequest>,
) -> ApiResult<Subscription> {
    let subscription = state
        .marketplace
        .set_auto_renew(subscription_id, payload.auto_renew)
        .await
        .map_err(settlement_error)?;

    Ok(Json(subscription))
}

async fn request_withdrawal(
    State(state): State<AppState>,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> ApiResult<WithdrawalRequest> {
    let payee = payload.payee().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "payee_id is required for this role".to_string(),
        )
    })?;
    let withdrawal = state
        .marketplace
        .request_withdrawal(payee, payload.amount)
        .await
        .map_err(settlement_error)?;

    Ok(Json(withdrawal))
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<WithdrawalListQuery>,
) -> ApiResult<Vec<WithdrawalRequest>> {
    let payee = query.payee().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "payee_id is required for this role".to_string(),
        )
    })?;
    let withdrawals = state
        .marketplace
        .list_withdrawals(payee, query.status)
        .await
        .map_err(settlement_error)?;

    Ok(Json(withdrawals))
}

async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    payload: Option<Json<ReviewRequest>>,
) -> ApiResult<WithdrawalRequest> {
    let note = payload.and_then(|Json(review)| review.note);
    let withdrawal = state
        .marketplace
        .approve_withdrawal(withdrawal_id, note)
        .await
        .map_err(settlement_error)?;

    Ok(Json(withdrawal))
}

async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<WithdrawalRequest> {
    let withdrawal = state
        .marketplace
        .reject_withdrawal(withdrawal_id, payload.note.as_deref().unwrap_or_default())
        .await
        .map_err(settlement_error)?;

    Ok(Json(withdrawal))
}

async fn commission_summary(
    State(state): State<AppState>,
    Path((role, payee_id)): Path<(String, Uuid)>,
) -> ApiResult<CommissionSummary> {
    let role = PayeeRole::parse(&role)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown payee role: {role}")))?;
    let payee = payee_from(role, Some(payee_id))
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "payee_id is required".to_string()))?;
    let summary = state
        .marketplace
        .get_commission_summary(payee)
        .await
        .map_err(settlement_error)?;

    Ok(Json(summary))
}

fn parse_subject(kind: &str, subject_id: Uuid) -> Result<Subject, (StatusCode, String)> {
    let kind = SubjectKind::parse(kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown subject kind: {kind}")))?;
    Ok(Subject::new(kind, subject_id))
}

fn settlement_error(err: SettlementError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => {
            error!("settlement request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(
            settlement_error(SettlementError::validation("bad")).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            settlement_error(SettlementError::not_found("plan", Uuid::nil())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            settlement_error(SettlementError::InsufficientBalance {
                requested: Decimal::new(10, 0),
                available: Decimal::ZERO,
            })
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            settlement_error(SettlementError::Upstream("timeout".to_string())).0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            settlement_error(SettlementError::Internal("disk".to_string())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rejects_unknown_subject_kinds() {
        assert!(parse_subject("company-branch", Uuid::nil()).is_ok());
        assert_eq!(
            parse_subject("warehouse", Uuid::nil()).unwrap_err().0,
            StatusCode::BAD_REQUEST
        );
    }
}
