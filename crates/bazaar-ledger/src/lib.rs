use bazaar_commission::SplitPlan;
use bazaar_core::{
    CommissionSplit, CommissionStore, LedgerEntry, LedgerStore, WalletOwner, WithdrawalStatus,
    WithdrawalStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedShare {
    pub payee: WalletOwner,
    pub amount: Decimal,
    /// False when an earlier attempt already credited this payee for the settlement.
    pub credited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingReport {
    pub settlement_id: Uuid,
    pub policy: String,
    pub shares: Vec<PostedShare>,
}

impl PostingReport {
    pub fn newly_credited(&self) -> impl Iterator<Item = &PostedShare> {
        self.shares.iter().filter(|share| share.credited)
    }
}

/// Records the split rows and credits every share of `plan` for one settlement.
///
/// Every write is keyed by `(settlement_id, payee)`, so replaying a partially applied
/// settlement fills in what is missing and never credits a payee twice.
pub async fn post_settlement<S>(
    store: &S,
    settlement_id: Uuid,
    plan: &SplitPlan,
) -> anyhow::Result<PostingReport>
where
    S: CommissionStore + LedgerStore + ?Sized,
{
    let mut shares = Vec::with_capacity(plan.shares.len());

    for share in &plan.shares {
        let split = if plan.policy.records_splits() {
            let (split, created) = store
                .insert_split_if_absent(CommissionSplit {
                    id: Uuid::new_v4(),
                    settlement_id,
                    price: plan.price,
                    payee: share.payee,
                    percent: share.percent,
                    amount: share.amount,
                    paid: false,
                    paid_at: None,
                    created_at: Utc::now(),
                })
                .await?;
            if !created {
                debug!("split for {} on settlement {} already recorded", share.payee, settlement_id);
            }
            Some(split)
        } else {
            None
        };

        let credited = if share.amount > Decimal::ZERO {
            store
                .post_credit(LedgerEntry::credit(share.payee, share.amount, settlement_id))
                .await?
        } else {
            false
        };

        if let Some(split) = split.filter(|split| !split.paid) {
            store.mark_split_paid(split.id, Utc::now()).await?;
        }

        shares.push(PostedShare {
            payee: share.payee,
            amount: share.amount,
            credited,
        });
    }

    let report = PostingReport {
        settlement_id,
        policy: plan.policy.name().to_string(),
        shares,
    };
    info!(
        "settlement {} posted under {} ({} new credits)",
        settlement_id,
        report.policy,
        report.newly_credited().count()
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSummary {
    pub payee: WalletOwner,
    pub total_earned: Decimal,
    pub total_withdrawn: Decimal,
    pub pending_withdrawals: Decimal,
    pub balance: Decimal,
    pub available: Decimal,
    pub recent_entries: Vec<LedgerEntry>,
}

pub async fn commission_summary<S>(
    store: &S,
    payee: WalletOwner,
    recent_limit: usize,
) -> anyhow::Result<CommissionSummary>
where
    S: LedgerStore + WithdrawalStore + ?Sized,
{
    let wallet = store.wallet(payee).await?;
    let recent_entries = store.entries_for(payee, recent_limit).await?;
    let pending: Decimal = store
        .withdrawals_for(payee, Some(WithdrawalStatus::Pending))
        .await?
        .iter()
        .map(|withdrawal| withdrawal.amount)
        .sum();

    Ok(CommissionSummary {
        payee,
        total_earned: wallet.total_earned,
        total_withdrawn: wallet.total_withdrawn,
        pending_withdrawals: pending,
        balance: wallet.balance,
        available: wallet.available(),
        recent_entries,
    })
}

#[cfg(test)]
mod tests {
    use bazaar_commission::{CommissionPolicy, split};
    use bazaar_core::{WithdrawalRequest, WithdrawalReservation};
    use bazaar_store::MemoryStore;

    use super::*;

    fn admin_salesperson(salesperson: Uuid) -> SplitPlan {
        split(
            CommissionPolicy::AdminSalesperson {
                salesperson,
                percent: Decimal::new(30, 0),
            },
            Decimal::new(100, 0),
        )
    }

    #[tokio::test]
    async fn posts_every_share_and_marks_splits_paid() {
        let store = MemoryStore::new();
        let salesperson = Uuid::new_v4();
        let settlement = Uuid::new_v4();

        let report = post_settlement(&store, settlement, &admin_salesperson(salesperson))
            .await
            .unwrap();
        assert_eq!(report.newly_credited().count(), 2);

        let splits = store.splits_for_settlement(settlement).await.unwrap();
        assert_eq!(splits.len(), 2);
        assert!(splits.iter().all(|split| split.paid && split.paid_at.is_some()));

        let wallet = store.wallet(WalletOwner::Salesperson(salesperson)).await.unwrap();
        assert_eq!(wallet.balance, Decimal::new(30, 0));
        assert_eq!(wallet.total_earned, Decimal::new(30, 0));
        assert_eq!(
            store.wallet(WalletOwner::Admin).await.unwrap().balance,
            Decimal::new(70, 0)
        );
    }

    #[tokio::test]
    async fn replaying_a_settlement_credits_nothing_new() {
        let store = MemoryStore::new();
        let salesperson = Uuid::new_v4();
        let settlement = Uuid::new_v4();
        let plan = admin_salesperson(salesperson);

        post_settlement(&store, settlement, &plan).await.unwrap();
        let replay = post_settlement(&store, settlement, &plan).await.unwrap();

        assert_eq!(replay.newly_credited().count(), 0);
        assert_eq!(store.entries_for_settlement(settlement).await.unwrap().len(), 2);
        assert_eq!(
            store.wallet(WalletOwner::Salesperson(salesperson)).await.unwrap().balance,
            Decimal::new(30, 0)
        );
    }

    #[tokio::test]
    async fn self_signup_credits_admin_without_split_rows() {
        let store = MemoryStore::new();
        let settlement = Uuid::new_v4();

        post_settlement(
            &store,
            settlement,
            &split(CommissionPolicy::SelfSignup, Decimal::new(100, 0)),
        )
        .await
        .unwrap();

        assert!(store.splits_for_settlement(settlement).await.unwrap().is_empty());
        let entries = store.entries_for_settlement(settlement).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].owner, WalletOwner::Admin);
        assert_eq!(entries[0].amount, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn summary_reports_pending_withdrawals() {
        let store = MemoryStore::new();
        let salesperson = Uuid::new_v4();
        let payee = WalletOwner::Salesperson(salesperson);
        post_settlement(&store, Uuid::new_v4(), &admin_salesperson(salesperson))
            .await
            .unwrap();

        let reservation = store
            .open_withdrawal(WithdrawalRequest {
                id: Uuid::new_v4(),
                payee,
                amount: Decimal::new(10, 0),
                status: WithdrawalStatus::Pending,
                admin_note: None,
                requested_at: Utc::now(),
                decided_at: None,
            })
            .await
            .unwrap();
        assert!(matches!(reservation, WithdrawalReservation::Reserved(_)));

        let summary = commission_summary(&store, payee, 10).await.unwrap();
        assert_eq!(summary.total_earned, Decimal::new(30, 0));
        assert_eq!(summary.pending_withdrawals, Decimal::new(10, 0));
        assert_eq!(summary.available, Decimal::new(20, 0));
        assert_eq!(summary.recent_entries.len(), 1);
    }
}
