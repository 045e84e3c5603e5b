use anyhow::Result;
use async_trait::async_trait;
use bazaar_core::SettlementEvent;
use bazaar_ports::{Notification, NotificationSink, StatusSink};

use crate::redis_bus::{NOTIFICATIONS_CHANNEL, RedisBus, SETTLEMENT_EVENTS_CHANNEL};

/// Publishes settlement events for the reconciler.
#[derive(Clone)]
pub struct RedisStatusSink {
    bus: RedisBus,
}

impl RedisStatusSink {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StatusSink for RedisStatusSink {
    async fn emit(&self, event: &SettlementEvent) -> Result<()> {
        self.bus.publish_json(SETTLEMENT_EVENTS_CHANNEL, event).await
    }
}

/// Hands notifications to the push/email delivery workers.
#[derive(Clone)]
pub struct RedisNotificationSink {
    bus: RedisBus,
}

impl RedisNotificationSink {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationSink for RedisNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.bus.publish_json(NOTIFICATIONS_CHANNEL, notification).await
    }
}
