use std::sync::Arc;

use bazaar_core::{
    Guarded, MarketplaceStore, SettlementError, SettlementEvent, SettlementEventKind,
    SettlementResult, WalletOwner, WithdrawalRequest, WithdrawalReservation, WithdrawalStatus,
};
use bazaar_ledger::{CommissionSummary, commission_summary};
use bazaar_ports::{Audience, Notification, NotificationSink, StatusSink};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::outbox::Outbox;

pub struct WithdrawalProcessor<TStore: ?Sized, TStatus: ?Sized, TNotify: ?Sized> {
    store: Arc<TStore>,
    outbox: Outbox<TStatus, TNotify>,
    minimum: Decimal,
    recent_entries: usize,
}

impl<TStore, TStatus, TNotify> WithdrawalProcessor<TStore, TStatus, TNotify>
where
    TStore: MarketplaceStore + ?Sized,
    TStatus: StatusSink + ?Sized,
    TNotify: NotificationSink + ?Sized,
{
    pub fn new(
        store: Arc<TStore>,
        outbox: Outbox<TStatus, TNotify>,
        minimum: Decimal,
        recent_entries: usize,
    ) -> Self {
        Self {
            store,
            outbox,
            minimum,
            recent_entries,
        }
    }

    /// The reservation and the pending request are written together.
    pub async fn request(
        &self,
        payee: WalletOwner,
        amount: Decimal,
    ) -> SettlementResult<WithdrawalRequest> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::validation("withdrawal amount must be positive"));
        }
        if amount < self.minimum {
            return Err(SettlementError::InvalidAmount {
                amount,
                minimum: self.minimum,
            });
        }

        let reservation = self
            .store
            .open_withdrawal(WithdrawalRequest {
                id: Uuid::new_v4(),
                payee,
                amount,
                status: WithdrawalStatus::Pending,
                admin_note: None,
                requested_at: Utc::now(),
                decided_at: None,
            })
            .await?;

        let withdrawal = match reservation {
            WithdrawalReservation::Reserved(withdrawal) => withdrawal,
            WithdrawalReservation::Insufficient { available } => {
                warn!("withdrawal of {amount} for {payee} refused, {available} available");
                return Err(SettlementError::InsufficientBalance {
                    requested: amount,
                    available,
                });
            }
        };

        info!("withdrawal {} of {} reserved for {}", withdrawal.id, amount, payee);
        self.outbox
            .emit(SettlementEvent::new(
                SettlementEventKind::WithdrawalRequested,
                None,
                withdrawal.id,
                json!({ "payee": payee, "amount": amount }),
            ))
            .await;
        Ok(withdrawal)
    }

    pub async fn approve(
        &self,
        withdrawal_id: Uuid,
        note: Option<String>,
    ) -> SettlementResult<WithdrawalRequest> {
        let note = note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());
        self.decide(withdrawal_id, WithdrawalStatus::Approved, note)
            .await
    }

    pub async fn reject(&self, withdrawal_id: Uuid, note: &str) -> SettlementResult<WithdrawalRequest> {
        let note = note.trim();
        if note.is_empty() {
            return Err(SettlementError::validation("a rejection note is required"));
        }
        self.decide(withdrawal_id, WithdrawalStatus::Rejected, Some(note.to_string()))
            .await
    }

    pub async fn list(
        &self,
        payee: WalletOwner,
        status: Option<WithdrawalStatus>,
    ) -> SettlementResult<Vec<WithdrawalRequest>> {
        Ok(self.store.withdrawals_for(payee, status).await?)
    }

    pub async fn summary(&self, payee: WalletOwner) -> SettlementResult<CommissionSummary> {
        Ok(commission_summary(self.store.as_ref(), payee, self.recent_entries).await?)
    }

    async fn decide(
        &self,
        withdrawal_id: Uuid,
        to: WithdrawalStatus,
        note: Option<String>,
    ) -> SettlementResult<WithdrawalRequest> {
        let withdrawal = match self
            .store
            .decide_withdrawal(withdrawal_id, to, note, Utc::now())
            .await?
        {
            Guarded::Applied(withdrawal) => withdrawal,
            Guarded::Stale(current) => {
                return Err(SettlementError::conflict(format!(
                    "withdrawal {} is already {}",
                    current.id,
                    current.status.as_str()
                )));
            }
            Guarded::Missing => {
                return Err(SettlementError::not_found("withdrawal", withdrawal_id));
            }
        };

        info!("withdrawal {} {}", withdrawal.id, to.as_str());
        self.outbox
            .emit(SettlementEvent::new(
                SettlementEventKind::WithdrawalDecided,
                None,
                withdrawal.id,
                json!({
                    "payee": withdrawal.payee,
                    "amount": withdrawal.amount,
                    "status": to.as_str(),
                }),
            ))
            .await;
        self.outbox
            .notify(Notification::new(
                Audience::Payee(withdrawal.payee),
                format!("Withdrawal {}", to.as_str()),
                match &withdrawal.admin_note {
                    Some(note) => format!("Your withdrawal of {} was {}: {note}", withdrawal.amount, to.as_str()),
                    None => format!("Your withdrawal of {} was {}.", withdrawal.amount, to.as_str()),
                },
            ))
            .await;
        Ok(withdrawal)
    }
}
