use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bazaar_core::{
    AccountRole, CommissionSplit, CommissionStore, Directory, Guarded, LedgerEntry, LedgerStore,
    OpenRequestInsert, OperationalStatusStore, OwningEntity, Plan, RequestPatch, RequestStatus,
    RequestStore, SalesManager, Salesperson, Subject, Subscription, SubscriptionRequest,
    SubscriptionStatus, SubscriptionStore, WalletBalance, WalletOwner, WithdrawalRequest,
    WithdrawalReservation, WithdrawalStatus, WithdrawalStore,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store kept entirely in process memory. Every compound operation runs under a single
/// write guard, which gives it the same atomicity the Postgres store gets from a
/// conditional statement or short transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    requests: HashMap<Uuid, SubscriptionRequest>,
    subscriptions: HashMap<Uuid, Subscription>,
    splits: HashMap<Uuid, CommissionSplit>,
    ledger: Vec<LedgerEntry>,
    wallets: HashMap<WalletOwner, WalletBalance>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
    plans: HashMap<Uuid, Plan>,
    entities: HashMap<Subject, OwningEntity>,
    operational: HashSet<Subject>,
    salespeople: HashMap<Uuid, Salesperson>,
    sales_managers: HashMap<Uuid, SalesManager>,
    roles: HashMap<Uuid, AccountRole>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_plan(&self, plan: Plan) {
        self.state.write().await.plans.insert(plan.id, plan);
    }

    pub async fn put_owning_entity(&self, subject: Subject, entity: OwningEntity) {
        self.state.write().await.entities.insert(subject, entity);
    }

    pub async fn put_account_role(&self, user_id: Uuid, role: AccountRole) {
        self.state.write().await.roles.insert(user_id, role);
    }

    pub async fn put_salesperson(&self, salesperson: Salesperson) {
        let mut state = self.state.write().await;
        state.roles.insert(salesperson.id, AccountRole::Salesperson);
        state.salespeople.insert(salesperson.id, salesperson);
    }

    pub async fn put_sales_manager(&self, manager: SalesManager) {
        let mut state = self.state.write().await;
        state.roles.insert(manager.id, AccountRole::SalesManager);
        state.sales_managers.insert(manager.id, manager);
    }

    pub async fn is_operational(&self, subject: Subject) -> bool {
        self.state.read().await.operational.contains(&subject)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(
        &self,
        request: SubscriptionRequest,
    ) -> anyhow::Result<OpenRequestInsert> {
        let mut state = self.state.write().await;
        if let Some(open) = state
            .requests
            .values()
            .find(|existing| existing.subject == request.subject && existing.status.is_open())
        {
            return Ok(OpenRequestInsert::Blocked(open.clone()));
        }
        if state
            .requests
            .values()
            .any(|existing| existing.correlation_id == request.correlation_id)
        {
            anyhow::bail!("correlation id {} already in use", request.correlation_id);
        }

        state.requests.insert(request.id, request.clone());
        Ok(OpenRequestInsert::Inserted(request))
    }

    async fn request(&self, request_id: Uuid) -> anyhow::Result<Option<SubscriptionRequest>> {
        Ok(self.state.read().await.requests.get(&request_id).cloned())
    }

    async fn request_by_correlation(
        &self,
        correlation_id: &str,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .find(|request| request.correlation_id == correlation_id)
            .cloned())
    }

    async fn open_request_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .find(|request| request.subject == subject && request.status.is_open())
            .cloned())
    }

    async fn latest_request_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<SubscriptionRequest>> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|request| request.subject == subject)
            .max_by_key(|request| request.requested_at)
            .cloned())
    }

    async fn transition_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
        to: RequestStatus,
        patch: RequestPatch,
    ) -> anyhow::Result<Guarded<SubscriptionRequest>> {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get_mut(&request_id) else {
            return Ok(Guarded::Missing);
        };
        if !from.contains(&request.status) {
            return Ok(Guarded::Stale(request.clone()));
        }

        request.status = to;
        patch.apply(request);
        Ok(Guarded::Applied(request.clone()))
    }

    async fn requests_in_status(
        &self,
        status: RequestStatus,
        requested_before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SubscriptionRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<SubscriptionRequest> = state
            .requests
            .values()
            .filter(|request| request.status == status && request.requested_at < requested_before)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.requested_at);
        Ok(requests)
    }

    async fn delete_request(
        &self,
        request_id: Uuid,
        from: &[RequestStatus],
    ) -> anyhow::Result<Guarded<SubscriptionRequest>> {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get(&request_id) else {
            return Ok(Guarded::Missing);
        };
        if !from.contains(&request.status) {
            return Ok(Guarded::Stale(request.clone()));
        }

        let removed = state.requests.remove(&request_id);
        Ok(removed.map(Guarded::Applied).unwrap_or(Guarded::Missing))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert_subscription_if_absent(
        &self,
        subscription: Subscription,
    ) -> anyhow::Result<(Subscription, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .subscriptions
            .values()
            .find(|existing| existing.request_id == subscription.request_id)
        {
            return Ok((existing.clone(), false));
        }

        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok((subscription, true))
    }

    async fn subscription(&self, subscription_id: Uuid) -> anyhow::Result<Option<Subscription>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .get(&subscription_id)
            .cloned())
    }

    async fn subscription_for_request(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|subscription| subscription.request_id == request_id)
            .cloned())
    }

    async fn active_subscription_for(
        &self,
        subject: Subject,
    ) -> anyhow::Result<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|subscription| {
                subscription.subject == subject
                    && subscription.status == SubscriptionStatus::Active
            })
            .max_by_key(|subscription| subscription.ends_at)
            .cloned())
    }

    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> anyhow::Result<Guarded<Subscription>> {
        let mut state = self.state.write().await;
        let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
            return Ok(Guarded::Missing);
        };
        if !from.contains(&subscription.status) {
            return Ok(Guarded::Stale(subscription.clone()));
        }

        subscription.status = to;
        Ok(Guarded::Applied(subscription.clone()))
    }

    async fn set_auto_renew(
        &self,
        subscription_id: Uuid,
        auto_renew: bool,
    ) -> anyhow::Result<Option<Subscription>> {
        let mut state = self.state.write().await;
        Ok(state
            .subscriptions
            .get_mut(&subscription_id)
            .map(|subscription| {
                subscription.auto_renew = auto_renew;
                subscription.clone()
            }))
    }

    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|subscription| {
                subscription.status == SubscriptionStatus::Active && subscription.ends_at <= now
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommissionStore for MemoryStore {
    async fn insert_split_if_absent(
        &self,
        split: CommissionSplit,
    ) -> anyhow::Result<(CommissionSplit, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.splits.values().find(|existing| {
            existing.settlement_id == split.settlement_id && existing.payee == split.payee
        }) {
            return Ok((existing.clone(), false));
        }

        state.splits.insert(split.id, split.clone());
        Ok((split, true))
    }

    async fn splits_for_settlement(
        &self,
        settlement_id: Uuid,
    ) -> anyhow::Result<Vec<CommissionSplit>> {
        let state = self.state.read().await;
        let mut splits: Vec<CommissionSplit> = state
            .splits
            .values()
            .filter(|split| split.settlement_id == settlement_id)
            .cloned()
            .collect();
        splits.sort_by_key(|split| split.created_at);
        Ok(splits)
    }

    async fn mark_split_paid(&self, split_id: Uuid, paid_at: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        match state.splits.get_mut(&split_id) {
            Some(split) if !split.paid => {
                split.paid = true;
                split.paid_at = Some(paid_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn post_credit(&self, entry: LedgerEntry) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        if state.ledger.iter().any(|existing| {
            existing.settlement_id == entry.settlement_id && existing.owner == entry.owner
        }) {
            return Ok(false);
        }

        let wallet = state
            .wallets
            .entry(entry.owner)
            .or_insert_with(|| WalletBalance::empty(entry.owner));
        wallet.balance += entry.amount;
        wallet.total_earned += entry.amount;
        wallet.updated_at = entry.created_at;

        state.ledger.push(entry);
        Ok(true)
    }

    async fn wallet(&self, owner: WalletOwner) -> anyhow::Result<WalletBalance> {
        let state = self.state.read().await;
        Ok(state
            .wallets
            .get(&owner)
            .cloned()
            .unwrap_or_else(|| WalletBalance::empty(owner)))
    }

    async fn entries_for(
        &self,
        owner: WalletOwner,
        limit: usize,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|entry| entry.owner == owner)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn entries_for_settlement(
        &self,
        settlement_id: Uuid,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|entry| entry.settlement_id == settlement_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn open_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> anyhow::Result<WithdrawalReservation> {
        let mut state = self.state.write().await;
        let wallet = state
            .wallets
            .entry(request.payee)
            .or_insert_with(|| WalletBalance::empty(request.payee));

        let available = wallet.available();
        if request.amount > available {
            return Ok(WithdrawalReservation::Insufficient { available });
        }

        wallet.pending_withdrawals += request.amount;
        wallet.updated_at = request.requested_at;
        state.withdrawals.insert(request.id, request.clone());
        Ok(WithdrawalReservation::Reserved(request))
    }

    async fn withdrawal(&self, withdrawal_id: Uuid) -> anyhow::Result<Option<WithdrawalRequest>> {
        Ok(self
            .state
            .read()
            .await
            .withdrawals
            .get(&withdrawal_id)
            .cloned())
    }

    async fn decide_withdrawal(
        &self,
        withdrawal_id: Uuid,
        to: WithdrawalStatus,
        admin_note: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> anyhow::Result<Guarded<WithdrawalRequest>> {
        let mut state = self.state.write().await;
        let Some(withdrawal) = state.withdrawals.get_mut(&withdrawal_id) else {
            return Ok(Guarded::Missing);
        };
        if withdrawal.status != WithdrawalStatus::Pending || to == WithdrawalStatus::Pending {
            return Ok(Guarded::Stale(withdrawal.clone()));
        }

        withdrawal.status = to;
        if admin_note.is_some() {
            withdrawal.admin_note = admin_note;
        }
        withdrawal.decided_at = Some(decided_at);
        let decided = withdrawal.clone();

        let wallet = state
            .wallets
            .entry(decided.payee)
            .or_insert_with(|| WalletBalance::empty(decided.payee));
        wallet.pending_withdrawals -= decided.amount;
        if to == WithdrawalStatus::Approved {
            wallet.balance -= decided.amount;
            wallet.total_withdrawn += decided.amount;
        }
        wallet.updated_at = decided_at;

        Ok(Guarded::Applied(decided))
    }

    async fn withdrawals_for(
        &self,
        owner: WalletOwner,
        status: Option<WithdrawalStatus>,
    ) -> anyhow::Result<Vec<WithdrawalRequest>> {
        let state = self.state.read().await;
        let mut withdrawals: Vec<WithdrawalRequest> = state
            .withdrawals
            .values()
            .filter(|withdrawal| withdrawal.payee == owner)
            .filter(|withdrawal| status.is_none_or(|status| withdrawal.status == status))
            .cloned()
            .collect();
        withdrawals.sort_by_key(|withdrawal| std::cmp::Reverse(withdrawal.requested_at));
        Ok(withdrawals)
    }
}

#[async_trait]
impl OperationalStatusStore for MemoryStore {
    async fn mark_operational(&self, subject: Subject) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        if !state.entities.contains_key(&subject) {
            return Ok(false);
        }
        Ok(state.operational.insert(subject))
    }

    async fn reconcile_operational(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Subject>> {
        let mut state = self.state.write().await;
        let due: HashSet<Subject> = state
            .subscriptions
            .values()
            .filter(|subscription| subscription.is_current(now))
            .map(|subscription| subscription.subject)
            .filter(|subject| {
                state.entities.contains_key(subject) && !state.operational.contains(subject)
            })
            .collect();

        state.operational.extend(due.iter().copied());
        Ok(due.into_iter().collect())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn plan(&self, plan_id: Uuid) -> anyhow::Result<Option<Plan>> {
        Ok(self.state.read().await.plans.get(&plan_id).cloned())
    }

    async fn owning_entity(&self, subject: Subject) -> anyhow::Result<Option<OwningEntity>> {
        Ok(self.state.read().await.entities.get(&subject).cloned())
    }

    async fn salesperson(&self, user_id: Uuid) -> anyhow::Result<Option<Salesperson>> {
        Ok(self.state.read().await.salespeople.get(&user_id).cloned())
    }

    async fn sales_manager(&self, user_id: Uuid) -> anyhow::Result<Option<SalesManager>> {
        Ok(self.state.read().await.sales_managers.get(&user_id).cloned())
    }

    async fn account_role(&self, user_id: Uuid) -> anyhow::Result<Option<AccountRole>> {
        Ok(self.state.read().await.roles.get(&user_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use bazaar_core::{
        CommissionPolicy, PaymentStatus, PurchaseMode, Share, SplitPlan, SubjectKind,
    };
    use rust_decimal::Decimal;

    use super::*;

    fn pending_request(subject: Subject) -> SubscriptionRequest {
        SubscriptionRequest {
            id: Uuid::new_v4(),
            subject,
            plan_id: Uuid::new_v4(),
            amount: Decimal::new(10000, 2),
            currency: "XAF".to_string(),
            correlation_id: Uuid::new_v4().simple().to_string(),
            mode: PurchaseMode::Gateway,
            status: RequestStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            collect_url: None,
            failure_reason: None,
            admin_note: None,
            requested_at: Utc::now(),
            paid_at: None,
            processed_at: None,
        }
    }

    fn withdrawal(payee: WalletOwner, amount: Decimal) -> WithdrawalRequest {
        WithdrawalRequest {
            id: Uuid::new_v4(),
            payee,
            amount,
            status: WithdrawalStatus::Pending,
            admin_note: None,
            requested_at: Utc::now(),
            decided_at: None,
        }
    }

    #[tokio::test]
    async fn second_open_request_for_subject_is_blocked() {
        let store = MemoryStore::new();
        let subject = Subject::new(SubjectKind::ServiceProvider, Uuid::new_v4());

        let first = pending_request(subject);
        assert!(matches!(
            store.insert_request(first.clone()).await.unwrap(),
            OpenRequestInsert::Inserted(_)
        ));

        match store.insert_request(pending_request(subject)).await.unwrap() {
            OpenRequestInsert::Blocked(open) => assert_eq!(open.id, first.id),
            OpenRequestInsert::Inserted(_) => panic!("duplicate open request was inserted"),
        }
    }

    #[tokio::test]
    async fn guarded_transition_leaves_state_untouched_when_stale() {
        let store = MemoryStore::new();
        let request = pending_request(Subject::new(SubjectKind::CompanyBranch, Uuid::new_v4()));
        store.insert_request(request.clone()).await.unwrap();

        let applied = store
            .transition_request(
                request.id,
                &[RequestStatus::PendingPayment],
                RequestStatus::Failed,
                RequestPatch::default(),
            )
            .await
            .unwrap();
        assert!(matches!(applied, Guarded::Applied(ref r) if r.status == RequestStatus::Failed));

        let stale = store
            .transition_request(
                request.id,
                &[RequestStatus::PendingPayment],
                RequestStatus::Active,
                RequestPatch {
                    payment_status: Some(PaymentStatus::Success),
                    ..RequestPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(stale, Guarded::Stale(ref r) if r.status == RequestStatus::Failed));

        let stored = store.request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Failed);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        let missing = store
            .transition_request(
                Uuid::new_v4(),
                &[RequestStatus::PendingPayment],
                RequestStatus::Active,
                RequestPatch::default(),
            )
            .await
            .unwrap();
        assert!(matches!(missing, Guarded::Missing));
    }

    #[tokio::test]
    async fn credit_is_posted_once_per_settlement_and_owner() {
        let store = MemoryStore::new();
        let owner = WalletOwner::Salesperson(Uuid::new_v4());
        let settlement_id = Uuid::new_v4();

        assert!(
            store
                .post_credit(LedgerEntry::credit(owner, Decimal::new(30, 0), settlement_id))
                .await
                .unwrap()
        );
        assert!(
            !store
                .post_credit(LedgerEntry::credit(owner, Decimal::new(30, 0), settlement_id))
                .await
                .unwrap()
        );

        let wallet = store.wallet(owner).await.unwrap();
        assert_eq!(wallet.balance, Decimal::new(30, 0));
        assert_eq!(wallet.total_earned, Decimal::new(30, 0));
        assert_eq!(store.entries_for(owner, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reservation_bounds_withdrawals_and_decisions_release_it() {
        let store = MemoryStore::new();
        let owner = WalletOwner::SalesManager(Uuid::new_v4());
        store
            .post_credit(LedgerEntry::credit(owner, Decimal::new(100, 0), Uuid::new_v4()))
            .await
            .unwrap();

        let first = match store
            .open_withdrawal(withdrawal(owner, Decimal::new(60, 0)))
            .await
            .unwrap()
        {
            WithdrawalReservation::Reserved(request) => request,
            WithdrawalReservation::Insufficient { .. } => panic!("first withdrawal rejected"),
        };

        match store
            .open_withdrawal(withdrawal(owner, Decimal::new(50, 0)))
            .await
            .unwrap()
        {
            WithdrawalReservation::Insufficient { available } => {
                assert_eq!(available, Decimal::new(40, 0))
            }
            WithdrawalReservation::Reserved(_) => panic!("over-reservation accepted"),
        }

        store
            .decide_withdrawal(first.id, WithdrawalStatus::Approved, None, Utc::now())
            .await
            .unwrap();
        let wallet = store.wallet(owner).await.unwrap();
        assert_eq!(wallet.balance, Decimal::new(40, 0));
        assert_eq!(wallet.pending_withdrawals, Decimal::ZERO);
        assert_eq!(wallet.total_withdrawn, Decimal::new(60, 0));

        let again = store
            .decide_withdrawal(first.id, WithdrawalStatus::Rejected, None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(again, Guarded::Stale(_)));
        assert_eq!(store.wallet(owner).await.unwrap().balance, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn subscription_insert_is_keyed_by_request() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let subject = Subject::new(SubjectKind::WholesalerBranch, Uuid::new_v4());
        let request_id = Uuid::new_v4();
        let make = |price: Decimal| Subscription {
            id: Uuid::new_v4(),
            request_id,
            subject,
            plan_id: Uuid::new_v4(),
            starts_at: now,
            ends_at: now + chrono::Duration::days(30),
            status: SubscriptionStatus::Active,
            auto_renew: false,
            split_plan: SplitPlan {
                price,
                policy: CommissionPolicy::SelfSignup,
                shares: vec![Share {
                    payee: WalletOwner::Admin,
                    percent: Decimal::ONE_HUNDRED,
                    amount: price,
                }],
            },
            created_at: now,
        };

        let (first, created) = store
            .insert_subscription_if_absent(make(Decimal::new(100, 0)))
            .await
            .unwrap();
        assert!(created);
        let (second, created) = store
            .insert_subscription_if_absent(make(Decimal::new(250, 0)))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.split_plan.price, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn reconcile_activates_owners_of_current_subscriptions_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let owned = Subject::new(SubjectKind::CompanyBranch, Uuid::new_v4());
        let orphan = Subject::new(SubjectKind::CompanyBranch, Uuid::new_v4());
        let owner = Uuid::new_v4();
        store
            .put_owning_entity(
                owned,
                OwningEntity {
                    id: Uuid::new_v4(),
                    user_id: owner,
                    created_by: owner,
                },
            )
            .await;
        for subject in [owned, orphan] {
            store
                .insert_subscription_if_absent(Subscription {
                    id: Uuid::new_v4(),
                    request_id: Uuid::new_v4(),
                    subject,
                    plan_id: Uuid::new_v4(),
                    starts_at: now,
                    ends_at: now + chrono::Duration::days(30),
                    status: SubscriptionStatus::Active,
                    auto_renew: false,
                    split_plan: SplitPlan {
                        price: Decimal::new(100, 0),
                        policy: CommissionPolicy::SelfSignup,
                        shares: Vec::new(),
                    },
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let later = now + chrono::Duration::days(31);
        assert!(store.reconcile_operational(later).await.unwrap().is_empty());
        assert!(!store.is_operational(owned).await);

        assert_eq!(store.reconcile_operational(now).await.unwrap(), vec![owned]);
        assert!(store.is_operational(owned).await);
        assert!(store.reconcile_operational(now).await.unwrap().is_empty());
        assert!(!store.mark_operational(owned).await.unwrap());
        assert!(!store.mark_operational(orphan).await.unwrap());
    }
}
