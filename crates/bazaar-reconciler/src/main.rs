use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bazaar_core::{OperationalStatusStore, SettlementEvent, SettlementEventKind};
use bazaar_platform::{
    GatewayConfig, HttpPaymentGateway, RedisBus, RedisNotificationSink, RedisStatusSink,
    ReconcileConfig, SETTLEMENT_EVENTS_CHANNEL, ServiceConfig, apply_schema, connect_database,
    settlement_settings_from_env,
};
use bazaar_settlement::{ConfirmOutcome, Marketplace};
use bazaar_store::PgStore;
use chrono::Utc;
use futures_util::StreamExt;
use redis::Msg;
use tracing::{debug, error, info};

type SettlementMarketplace =
    Marketplace<PgStore, HttpPaymentGateway, RedisStatusSink, RedisNotificationSink>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bazaar_reconciler=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let reconcile = ReconcileConfig::from_env()?;
    let gateway_config = GatewayConfig::from_env()?;
    let settings = settlement_settings_from_env()?;

    let pool = connect_database(&config.database_url).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let store = Arc::new(PgStore::new(pool));
    let marketplace: SettlementMarketplace = Marketplace::new(
        Arc::clone(&store),
        Arc::new(HttpPaymentGateway::new(&gateway_config)?),
        Arc::new(RedisStatusSink::new(redis.clone())),
        Arc::new(RedisNotificationSink::new(redis.clone())),
        settings,
    );

    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(SETTLEMENT_EVENTS_CHANNEL).await?;
    let mut messages = pubsub.on_message();
    let mut ticker = tokio::time::interval(Duration::from_secs(reconcile.interval_secs));

    info!(
        "reconciler subscribed to {}, sweeping every {}s",
        SETTLEMENT_EVENTS_CHANNEL, reconcile.interval_secs
    );

    loop {
        tokio::select! {
            msg = messages.next() => {
                let msg = msg.context("settlement.events stream ended unexpectedly")?;
                if let Err(err) = handle_message(store.as_ref(), msg).await {
                    error!("failed to process settlement event: {err:#}");
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = sweep(&marketplace).await {
                    error!("reconcile sweep failed: {err:#}");
                }
            }
        }
    }
}

async fn handle_message(store: &PgStore, msg: Msg) -> Result<()> {
    let payload: String = msg.get_payload()?;
    let event: SettlementEvent = serde_json::from_str(&payload)?;

    match (event.kind, event.subject) {
        (SettlementEventKind::SubscriptionActivated, Some(subject)) => {
            if store.mark_operational(subject).await? {
                info!(
                    "{} {} is now operational",
                    subject.kind.as_str(),
                    subject.id
                );
            } else {
                debug!(
                    "{} {} already operational, event {} ignored",
                    subject.kind.as_str(),
                    subject.id,
                    event.id
                );
            }
        }
        (kind, _) => debug!("settlement event {:?} for {}", kind, event.reference_id),
    }
    Ok(())
}

async fn sweep(marketplace: &SettlementMarketplace) -> Result<()> {
    let now = Utc::now();

    let outcomes = marketplace.reverify_stale(now).await?;
    let activated = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ConfirmOutcome::Activated { .. }))
        .count();
    let failed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ConfirmOutcome::Failed { .. }))
        .count();
    if !outcomes.is_empty() {
        info!(
            "re-verified {} stale payments: {} activated, {} failed",
            outcomes.len(),
            activated,
            failed
        );
    }

    let expired = marketplace.expire_lapsed(now).await?;
    if !expired.is_empty() {
        info!("expired {} lapsed subscriptions", expired.len());
    }

    let reactivated = marketplace.reconcile_operational_status(now).await?;
    if !reactivated.is_empty() {
        info!("activated {} subjects missed by the event stream", reactivated.len());
    }

    Ok(())
}
