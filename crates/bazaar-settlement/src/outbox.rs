use std::sync::Arc;

use bazaar_core::SettlementEvent;
use bazaar_ports::{Notification, NotificationSink, StatusSink};
use tracing::{debug, warn};

/// Best-effort delivery of settlement events and notifications. Sink failures are
/// logged and never reach the caller.
pub struct Outbox<TStatus: ?Sized, TNotify: ?Sized> {
    status: Arc<TStatus>,
    notifier: Arc<TNotify>,
}

impl<TStatus: ?Sized, TNotify: ?Sized> Clone for Outbox<TStatus, TNotify> {
    fn clone(&self) -> Self {
        Self {
            status: Arc::clone(&self.status),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<TStatus, TNotify> Outbox<TStatus, TNotify>
where
    TStatus: StatusSink + ?Sized,
    TNotify: NotificationSink + ?Sized,
{
    pub fn new(status: Arc<TStatus>, notifier: Arc<TNotify>) -> Self {
        Self { status, notifier }
    }

    pub async fn emit(&self, event: SettlementEvent) {
        match self.status.emit(&event).await {
            Ok(()) => debug!("emitted {:?} for {}", event.kind, event.reference_id),
            Err(err) => warn!(
                "failed to emit {:?} for {}: {err:#}",
                event.kind, event.reference_id
            ),
        }
    }

    pub async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(&notification).await {
            warn!("failed to send notification '{}': {err:#}", notification.title);
        }
    }
}
