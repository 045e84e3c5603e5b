use anyhow::Context;
use async_trait::async_trait;
use bazaar_core::{
    AccountRole, CommissionSplit, CommissionStore, Directory, EntryKind, Guarded, LedgerEntry,
    LedgerStore, OpenRequestInsert, OperationalStatusStore, OwningEntity, PayeeRole,
    PaymentStatus, Plan, PlanDuration, PurchaseMode, RequestPatch, RequestStatus, RequestStore,
    SalesManager, Salesperson, SplitPlan, Subject, SubjectKind, Subscription, SubscriptionRequest,
    SubscriptionStatus, SubscriptionStore, WalletBalance, WalletOwner, WithdrawalRequest,
    WithdrawalReservation, WithdrawalStatus, WithdrawalStore,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::debug;
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "id, subject_kind, subject_id, plan_id, amount, currency, \
     correlation_id, mode, status, payment_status, collect_url, failure_reason, admin_note, \
     requested_at, paid_at, processed_at";
const SUBSCRIPTION_COLUMNS: &str =
    "id, request_id, subject_kind, subject_id, plan_id, starts_at, ends_at, status, auto_renew, \
     split_plan, created_at";
const SPLIT_COLUMNS: &str =
    "id, settlement_id, price, payee_role, payee_id, percent, amount, paid, paid_at, created_at";
const ENTRY_COLUMNS: &str = "id, owner_role, owner_id, entry_kind, amount, settlement_id, created_at";
const WALLET_COLUMNS: &str =
    "owner_role, owner_id, balance, pending_withdrawals, total_earned, total_withdrawn, updated_at";
const WITHDRAWAL_COLUMNS: &str =
    "id, payee_role, payee_id, amount, status, admin_note, requested_at, decided_at";

/// Postgres-backed store. Every state machine write is a conditional `UPDATE ... WHERE
/// status = ANY(...)`; ledger credits and reservations are additive updates.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_list(statuses: &[RequestStatus]) -> Vec<String> {
    statuses
        .iter()
        .map(|status| status.as_str().to_string())
        .collect()
}

fn parse_column<T>(value: String, parse: fn(&str) -> Option<T>, column: &str) -> anyhow::Result<T> {
    parse(&value).with_context(|| format!("unrecognized {column} value {value:?}"))
}

fn request_from_row(row: &PgRow) -> anyhow::Result<SubscriptionRequest> {
    Ok(SubscriptionRequest {
        id: row.try_get("id")?,
        subject: Subject::new(
            parse_column(row.try_get("subject_kind")?, SubjectKind::parse, "subject_kind")?,
            row.try_get("subject_id")?,
        ),
        plan_id: row.try_get("plan_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        correlation_id: row.try_get("correlation_id")?,
        mode: parse_column(row.try_get("mode")?, PurchaseMode::parse, "mode")?,
        status: parse_column(row.try_get("status")?, RequestStatus::parse, "status")?,
        payment_status: parse_column(
            row.try_get("payment_status")?,
            PaymentStatus::parse,
            "payment_status",
        )?,
        collect_url: row.try_get("collect_url")?,
        failure_reason: row.try_get("failure_reason")?,
        admin_note: row.try_get("admin_note")?,
        requested_at: row.try_get("requested_at")?,
        paid_at: row.try_get("paid_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> anyhow::Result<Subscription> {
    Ok(Subscription {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        subject: Subject::new(
            parse_column(row.try_get("subject_kind")?, SubjectKind::parse, "subject_kind")?,
            row.try_get("subject_id")?,
        ),
        plan_id: row.try_get("plan_id")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        status: parse_column(row.try_get("status")?, SubscriptionStatus::parse, "status")?,
        auto_renew: row.try_get("auto_renew")?,
        split_plan: row.try_get::<Json<SplitPlan>, _>("split_plan")?.0,
        created_at: row.try_get("created_at")?,
    })
}

fn owner_from_row(row: &PgRow, role_column: &str, id_column: &str) -> anyhow::Result<WalletOwner> {
    let role = parse_column(row.try_get(role_column)?, PayeeRole::parse, role_column)?;
    Ok(WalletOwner::from_parts(role, row.try_get(id_column)?))
}

fn split_from_row(row: &PgRow) -> anyhow::Result<CommissionSplit> {
    Ok(CommissionSplit {
        id: row.try_get("id")?,
        settlement_id: row.try_get("settlement_id")?,
        price: row.try_get("price")?,
        payee: owner_from_row(row, "payee_role", "payee_id")?,
        percent: row.try_get("percent")?,
        amount: row.try_get("amount")?,
        paid: row.try_get("paid")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> anyhow::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        owner: owner_from_row(row, "owner_role", "owner_id")?,
        kind: parse_column(row.try_get("entry_kind")?, EntryKind::parse, "entry_kind")?,
        amount: row.try_get("amount")?,
        settlement_id: row.try_get("settlement_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn wallet_from_row(row: &PgRow) -> anyhow::Result<WalletBalance> {
    Ok(WalletBalance {
        owner: owner_from_row(row, "owner_role", "owner_id")?,
        balance: row.try_get("balance")?,
        pending_withdrawals: row.try_get("pending_withdrawals")?,
        total_earned: row.try_get("total_earned")?,
        total_withdrawn: row.try_get("total_withdrawn")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> anyhow::Result<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        id: row.try_get("id")?,
        payee: owner_from_row(row, "payee_role", "payee_id")?,
        amount: row.try_get("amount")?,
        status: parse_column(row.try_get("status")?, WithdrawalStatus::parse, "status")?,
        admin_note: row.try_get("admin_note")?,
        requested_at: row.try_get("requested_at")?,
        decided_at: row.try_get("decided_at")?,
    })
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert_request(
        &self,
        request: SubscriptionRequest,
    ) -> anyhow::Result<OpenRequestInsert> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO subscription_requests (
                id, subject_kind, subject_id, plan_id, amount, currency, correlation_id, mode,
                status, payment_status, collect_url, failure_reason, admin_note, requested_at,
                paid_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (subject_kind, subject_id) WHERE status IN ('pending_payment', 'pending')
            DO NOTHING
            "#,
        )
        .bind(request.id)
        .bind(request.subject.kind.as_str())
        .bind(request.subject.id)
        .bind(request.plan_id)
        .bind(request.amount)
        .bind(&request.currency)
        .bind(&request.correlation_id)
        .bind(request.mode.as_str())
        .bind(request.status.as_str())
        .bind(request.payment_status.as_str())
        .bind(&request.collect_url)
        .bind(&request.failure_reason)
        .bind(&request.admin_note)
        .bind(request.requested_at)
        .bind(request.paid_at)
        .bind(request.processed_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(OpenRequestInsert::Inserted(request));
        }

        let open = self
            .open_request_for(request.subject)
            .await?
            .context("open request conflict reported but no open request found")?;
        Ok(OpenRequestInsert::Blocked(open))
    }

    async fn request(&self, request_id: Uuid) -> anyhow::Result<Option<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM subscription_requests WHERE id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn request_by_correlation(
        &self,
        correlation_id: &str,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM subscription_requests WHERE correlation_id = $1"
        ))
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn open_request_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM subscription_requests
            WHERE subject_kind = $1 AND subject_id = $2 AND status = ANY($3)
            LIMIT 1
            "#
        ))
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .bind(status_list(&RequestStatus::OPEN))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn latest_request_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM subscription_requests
            WHERE subject_kind = $1 AND subject_id = $2
            ORDER BY requested_at DESC
            LIMIT 1
            "#
        ))
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn transition_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        to: RequestStatus,
        patch: RequestPatch,
    ) -> anyhow::Result<Guarded<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscription_requests
            SET status = $3,
                payment_status = COALESCE($4, payment_status),
                collect_url = COALESCE($5, collect_url),
                failure_reason = COALESCE($6, failure_reason),
                admin_note = COALESCE($7, admin_note),
                paid_at = COALESCE($8, paid_at),
                processed_at = COALESCE($9, processed_at)
            WHERE id = $1 AND status = ANY($2)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(status_list(from))
        .bind(to.as_str())
        .bind(patch.payment_status.map(|status| status.as_str()))
        .bind(patch.collect_url)
        .bind(patch.failure_reason)
        .bind(patch.admin_note)
        .bind(patch.paid_at)
        .bind(patch.processed_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Guarded::Applied(request_from_row(&row)?));
        }

        debug!("guarded transition of request {request_id} to {} not applied", to.as_str());
        Ok(match self.request(request_id).await? {
            Some(current) => Guarded::Stale(current),
            None => Guarded::Missing,
        })
    }

    async fn requests_in_status(
        &self,
        status: RequestStatus,
        requested_before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SubscriptionRequest>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM subscription_requests
            WHERE status = $1 AND requested_at < $2
            ORDER BY requested_at ASC
            LIMIT 500
            "#
        ))
        .bind(status.as_str())
        .bind(requested_before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    async fn delete_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
    ) -> anyhow::Result<Guarded<SubscriptionRequest>> {
        let row = sqlx::query(&format!(
            r#"
            DELETE FROM subscription_requests
            WHERE id = $1 AND status = ANY($2)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request_id)
        .bind(status_list(from))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Guarded::Applied(request_from_row(&row)?));
        }

        Ok(match self.request(request_id).await? {
            Some(current) => Guarded::Stale(current),
            None => Guarded::Missing,
        })
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn insert_subscription_if_absent(
        &self,
        subscription: Subscription,
    ) -> anyhow::Result<(Subscription, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, request_id, subject_kind, subject_id, plan_id, starts_at, ends_at, status,
                auto_renew, split_plan, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.request_id)
        .bind(subscription.subject.kind.as_str())
        .bind(subscription.subject.id)
        .bind(subscription.plan_id)
        .bind(subscription.starts_at)
        .bind(subscription.ends_at)
        .bind(subscription.status.as_str())
        .bind(subscription.auto_renew)
        .bind(Json(&subscription.split_plan))
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok((subscription, true));
        }

        let existing = self
            .subscription_for_request(subscription.request_id)
            .await?
            .context("subscription conflict reported but none stored for request")?;
        Ok((existing, false))
    }

    async fn subscription(&self, subscription_id: Uuid) -> anyhow::Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn subscription_for_request(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn active_subscription_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE subject_kind = $1 AND subject_id = $2 AND status = 'active'
            ORDER BY ends_at DESC
            LIMIT 1
            "#
        ))
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> anyhow::Result<Guarded<Subscription>> {
        let allowed: Vec<String> = from
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions
            SET status = $3
            WHERE id = $1 AND status = ANY($2)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(allowed)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Guarded::Applied(subscription_from_row(&row)?));
        }

        Ok(match self.subscription(subscription_id).await? {
            Some(current) => Guarded::Stale(current),
            None => Guarded::Missing,
        })
    }

    async fn set_auto_renew(
        &self,
        subscription_id: Uuid,
        auto_renew: bool,
    ) -> anyhow::Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "UPDATE subscriptions SET auto_renew = $2 WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription_id)
        .bind(auto_renew)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE status = 'active' AND ends_at <= $1
            ORDER BY ends_at ASC
            LIMIT 500
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }
}

#[async_trait]
impl CommissionStore for PgStore {
    async fn insert_split_if_absent(
        &self,
        split: CommissionSplit,
    ) -> anyhow::Result<(CommissionSplit, bool)> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO commission_splits (
                id, settlement_id, price, payee_role, payee_id, percent, amount, paid, paid_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (settlement_id, payee_role, payee_id) DO NOTHING
            RETURNING {SPLIT_COLUMNS}
            "#
        ))
        .bind(split.id)
        .bind(split.settlement_id)
        .bind(split.price)
        .bind(split.payee.role().as_str())
        .bind(split.payee.id())
        .bind(split.percent)
        .bind(split.amount)
        .bind(split.paid)
        .bind(split.paid_at)
        .bind(split.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok((split_from_row(&row)?, true));
        }

        let row = sqlx::query(&format!(
            r#"
            SELECT {SPLIT_COLUMNS}
            FROM commission_splits
            WHERE settlement_id = $1 AND payee_role = $2 AND payee_id = $3
            "#
        ))
        .bind(split.settlement_id)
        .bind(split.payee.role().as_str())
        .bind(split.payee.id())
        .fetch_one(&self.pool)
        .await?;
        Ok((split_from_row(&row)?, false))
    }

    async fn splits_for_settlement(
        &self,
        settlement_id: Uuid,
    ) -> anyhow::Result<Vec<CommissionSplit>> {
        let rows = sqlx::query(&format!(
            "SELECT {SPLIT_COLUMNS} FROM commission_splits WHERE settlement_id = $1 ORDER BY created_at ASC"
        ))
        .bind(settlement_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(split_from_row).collect()
    }

    async fn mark_split_paid(&self, split_id: Uuid, paid_at: DateTime<Utc>) -> anyhow::Result<bool> {
        let updated = sqlx::query(
            "UPDATE commission_splits SET paid = TRUE, paid_at = $2 WHERE id = $1 AND paid = FALSE",
        )
        .bind(split_id)
        .bind(paid_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn post_credit(&self, entry: LedgerEntry) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, owner_role, owner_id, entry_kind, amount, settlement_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (settlement_id, owner_role, owner_id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.owner.role().as_str())
        .bind(entry.owner.id())
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.settlement_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO wallet_balances (
                owner_role, owner_id, balance, pending_withdrawals, total_earned, total_withdrawn,
                updated_at
            )
            VALUES ($1, $2, $3, 0, $3, 0, $4)
            ON CONFLICT (owner_role, owner_id) DO UPDATE
            SET balance = wallet_balances.balance + EXCLUDED.balance,
                total_earned = wallet_balances.total_earned + EXCLUDED.total_earned,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(entry.owner.role().as_str())
        .bind(entry.owner.id())
        .bind(entry.amount)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn wallet(&self, owner: WalletOwner) -> anyhow::Result<WalletBalance> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallet_balances WHERE owner_role = $1 AND owner_id = $2"
        ))
        .bind(owner.role().as_str())
        .bind(owner.id())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => wallet_from_row(&row),
            None => Ok(WalletBalance::empty(owner)),
        }
    }

    async fn entries_for(
        &self,
        owner: WalletOwner,
        limit: usize,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE owner_role = $1 AND owner_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(owner.role().as_str())
        .bind(owner.id())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn entries_for_settlement(
        &self,
        settlement_id: Uuid,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE settlement_id = $1 ORDER BY created_at ASC"
        ))
        .bind(settlement_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

#[async_trait]
impl WithdrawalStore for PgStore {
    async fn open_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> anyhow::Result<WithdrawalReservation> {
        let mut tx = self.pool.begin().await?;

        let reserved = sqlx::query(
            r#"
            UPDATE wallet_balances
            SET pending_withdrawals = pending_withdrawals + $3,
                updated_at = $4
            WHERE owner_role = $1 AND owner_id = $2
              AND balance - pending_withdrawals >= $3
            "#,
        )
        .bind(request.payee.role().as_str())
        .bind(request.payee.id())
        .bind(request.amount)
        .bind(request.requested_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if reserved == 0 {
            tx.rollback().await?;
            let available = self.wallet(request.payee).await?.available();
            return Ok(WithdrawalReservation::Insufficient { available });
        }

        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (
                id, payee_role, payee_id, amount, status, admin_note, requested_at, decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id)
        .bind(request.payee.role().as_str())
        .bind(request.payee.id())
        .bind(request.amount)
        .bind(request.status.as_str())
        .bind(&request.admin_note)
        .bind(request.requested_at)
        .bind(request.decided_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(WithdrawalReservation::Reserved(request))
    }

    async fn withdrawal(&self, withdrawal_id: Uuid) -> anyhow::Result<Option<WithdrawalRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1"
        ))
        .bind(withdrawal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn decide_withdrawal(
        &self,
        withdrawal_id: Uuid,
        to: WithdrawalStatus,
        admin_note: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> anyhow::Result<Guarded<WithdrawalRequest>> {
        if to == WithdrawalStatus::Pending {
            return Ok(match self.withdrawal(withdrawal_id).await? {
                Some(current) => Guarded::Stale(current),
                None => Guarded::Missing,
            });
        }

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE withdrawal_requests
            SET status = $2,
                admin_note = COALESCE($3, admin_note),
                decided_at = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING {WITHDRAWAL_COLUMNS}
            "#
        ))
        .bind(withdrawal_id)
        .bind(to.as_str())
        .bind(admin_note)
        .bind(decided_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(match self.withdrawal(withdrawal_id).await? {
                Some(current) => Guarded::Stale(current),
                None => Guarded::Missing,
            });
        };
        let decided = withdrawal_from_row(&row)?;

        let (balance_delta, withdrawn_delta) = if to == WithdrawalStatus::Approved {
            (decided.amount, decided.amount)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        sqlx::query(
            r#"
            UPDATE wallet_balances
            SET pending_withdrawals = pending_withdrawals - $3,
                balance = balance - $4,
                total_withdrawn = total_withdrawn + $5,
                updated_at = $6
            WHERE owner_role = $1 AND owner_id = $2
            "#,
        )
        .bind(decided.payee.role().as_str())
        .bind(decided.payee.id())
        .bind(decided.amount)
        .bind(balance_delta)
        .bind(withdrawn_delta)
        .bind(decided_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Guarded::Applied(decided))
    }

    async fn withdrawals_for(
        &self,
        owner: WalletOwner,
        status: Option<WithdrawalStatus>,
    ) -> anyhow::Result<Vec<WithdrawalRequest>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WITHDRAWAL_COLUMNS}
            FROM withdrawal_requests
            WHERE payee_role = $1 AND payee_id = $2
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY requested_at DESC
            LIMIT 200
            "#
        ))
        .bind(owner.role().as_str())
        .bind(owner.id())
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(withdrawal_from_row).collect()
    }
}

#[async_trait]
impl OperationalStatusStore for PgStore {
    async fn mark_operational(&self, subject: Subject) -> anyhow::Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE subject_owners
            SET operational_status = 'active', updated_at = $3
            WHERE subject_kind = $1 AND subject_id = $2
              AND operational_status IS DISTINCT FROM 'active'
            "#,
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn reconcile_operational(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subject>> {
        let rows = sqlx::query(
            r#"
            UPDATE subject_owners owners
            SET operational_status = 'active', updated_at = $1
            FROM subscriptions s
            WHERE s.subject_kind = owners.subject_kind
              AND s.subject_id = owners.subject_id
              AND s.status = 'active'
              AND s.ends_at > $1
              AND owners.operational_status IS DISTINCT FROM 'active'
            RETURNING owners.subject_kind, owners.subject_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, anyhow::Error>(Subject::new(
                    parse_column(row.try_get("subject_kind")?, SubjectKind::parse, "subject_kind")?,
                    row.try_get("subject_id")?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn plan(&self, plan_id: Uuid) -> anyhow::Result<Option<Plan>> {
        let row = sqlx::query(
            "SELECT id, name, price, currency, duration_months, active FROM plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let months: i32 = row.try_get("duration_months")?;
        let duration = u32::try_from(months)
            .ok()
            .and_then(PlanDuration::from_months)
            .with_context(|| format!("plan {plan_id} has unsupported duration {months}"))?;

        Ok(Some(Plan {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            duration,
            active: row.try_get("active")?,
        }))
    }

    async fn owning_entity(&self, subject: Subject) -> anyhow::Result<Option<OwningEntity>> {
        let row = sqlx::query(
            r#"
            SELECT entity_id, user_id, created_by
            FROM subject_owners
            WHERE subject_kind = $1 AND subject_id = $2
            "#,
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok::<_, anyhow::Error>(OwningEntity {
                id: row.try_get("entity_id")?,
                user_id: row.try_get("user_id")?,
                created_by: row.try_get("created_by")?,
            })
        })
        .transpose()
    }

    async fn salesperson(&self, user_id: Uuid) -> anyhow::Result<Option<Salesperson>> {
        let row = sqlx::query(
            "SELECT user_id, commission_percent, created_by FROM salespeople WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok::<_, anyhow::Error>(Salesperson {
                id: row.try_get("user_id")?,
                commission_percent: row.try_get("commission_percent")?,
                created_by: row.try_get("created_by")?,
            })
        })
        .transpose()
    }

    async fn sales_manager(&self, user_id: Uuid) -> anyhow::Result<Option<SalesManager>> {
        let row = sqlx::query(
            "SELECT user_id, commission_percent FROM sales_managers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok::<_, anyhow::Error>(SalesManager {
                id: row.try_get("user_id")?,
                commission_percent: row.try_get("commission_percent")?,
            })
        })
        .transpose()
    }

    async fn account_role(&self, user_id: Uuid) -> anyhow::Result<Option<AccountRole>> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        role.map(|role| parse_column(role, AccountRole::parse, "role"))
            .transpose()
    }
}
