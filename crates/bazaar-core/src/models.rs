use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commission::SplitPlan;

pub const ADMIN_WALLET_ID: Uuid = Uuid::nil();

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    CompanyBranch,
    WholesalerBranch,
    ServiceProvider,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanyBranch => "company_branch",
            Self::WholesalerBranch => "wholesaler_branch",
            Self::ServiceProvider => "service_provider",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "company_branch" => Some(Self::CompanyBranch),
            "wholesaler_branch" => Some(Self::WholesalerBranch),
            "service_provider" => Some(Self::ServiceProvider),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: Uuid,
}

impl Subject {
    pub fn new(kind: SubjectKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlanDuration {
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl PlanDuration {
    pub fn from_months(months: u32) -> Option<Self> {
        match months {
            1 => Some(Self::OneMonth),
            3 => Some(Self::ThreeMonths),
            6 => Some(Self::SixMonths),
            12 => Some(Self::TwelveMonths),
            _ => None,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Self::OneMonth => 1,
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
            Self::TwelveMonths => 12,
        }
    }

    /// Calendar end of a period starting at `start`; day-of-month overflow clamps to the
    /// last day of the target month.
    pub fn end_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.months()))
    }
}

impl TryFrom<u32> for PlanDuration {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_months(value).ok_or_else(|| format!("unsupported plan duration {value}"))
    }
}

impl From<PlanDuration> for u32 {
    fn from(value: PlanDuration) -> Self {
        value.months()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub duration: PlanDuration,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingPayment,
    Pending,
    Active,
    Failed,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const OPEN: [RequestStatus; 2] = [RequestStatus::PendingPayment, RequestStatus::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending_payment" => Some(Self::PendingPayment),
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "failed" => Some(Self::Failed),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseMode {
    #[default]
    Gateway,
    Manual,
}

impl PurchaseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gateway" => Some(Self::Gateway),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn initial_status(&self) -> RequestStatus {
        match self {
            Self::Gateway => RequestStatus::PendingPayment,
            Self::Manual => RequestStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: Uuid,
    pub subject: Subject,
    pub plan_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub correlation_id: String,
    pub mode: PurchaseMode,
    pub status: RequestStatus,
    pub payment_status: PaymentStatus,
    pub collect_url: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl SubscriptionRequest {
    pub fn is_settled(&self) -> bool {
        self.payment_status == PaymentStatus::Success
            || matches!(self.status, RequestStatus::Active | RequestStatus::Approved)
    }
}

/// Field updates carried by a guarded request transition. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub payment_status: Option<PaymentStatus>,
    pub collect_url: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RequestPatch {
    pub fn apply(&self, request: &mut SubscriptionRequest) {
        if let Some(payment_status) = self.payment_status {
            request.payment_status = payment_status;
        }
        if let Some(collect_url) = &self.collect_url {
            request.collect_url = Some(collect_url.clone());
        }
        if let Some(failure_reason) = &self.failure_reason {
            request.failure_reason = Some(failure_reason.clone());
        }
        if let Some(admin_note) = &self.admin_note {
            request.admin_note = Some(admin_note.clone());
        }
        if let Some(paid_at) = self.paid_at {
            request.paid_at = Some(paid_at);
        }
        if let Some(processed_at) = self.processed_at {
            request.processed_at = Some(processed_at);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub request_id: Uuid,
    pub subject: Subject,
    pub plan_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub auto_renew: bool,
    pub split_plan: SplitPlan,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.ends_at > now
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.is_current(now) {
            self.ends_at - now
        } else {
            Duration::zero()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayeeRole {
    Salesperson,
    SalesManager,
    Admin,
}

impl PayeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salesperson => "salesperson",
            Self::SalesManager => "sales_manager",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "salesperson" => Some(Self::Salesperson),
            "sales_manager" => Some(Self::SalesManager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum WalletOwner {
    Admin,
    Salesperson(Uuid),
    SalesManager(Uuid),
}

impl WalletOwner {
    pub fn from_parts(role: PayeeRole, id: Uuid) -> Self {
        match role {
            PayeeRole::Admin => Self::Admin,
            PayeeRole::Salesperson => Self::Salesperson(id),
            PayeeRole::SalesManager => Self::SalesManager(id),
        }
    }

    pub fn role(&self) -> PayeeRole {
        match self {
            Self::Admin => PayeeRole::Admin,
            Self::Salesperson(_) => PayeeRole::Salesperson,
            Self::SalesManager(_) => PayeeRole::SalesManager,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Admin => ADMIN_WALLET_ID,
            Self::Salesperson(id) | Self::SalesManager(id) => *id,
        }
    }

    pub fn entry_kind(&self) -> EntryKind {
        match self {
            Self::Admin => EntryKind::WalletTransaction,
            Self::Salesperson(_) | Self::SalesManager(_) => EntryKind::CommissionRecord,
        }
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Salesperson(id) => write!(f, "salesperson:{id}"),
            Self::SalesManager(id) => write!(f, "sales_manager:{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub id: Uuid,
    pub settlement_id: Uuid,
    pub price: Decimal,
    pub payee: WalletOwner,
    pub percent: Decimal,
    pub amount: Decimal,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CommissionSplit {
    pub fn role(&self) -> PayeeRole {
        self.payee.role()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    WalletTransaction,
    CommissionRecord,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletTransaction => "wallet_transaction",
            Self::CommissionRecord => "commission_record",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "wallet_transaction" => Some(Self::WalletTransaction),
            "commission_record" => Some(Self::CommissionRecord),
            _ => None,
        }
    }
}

/// Append-only credit. At most one entry exists per (settlement_id, owner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub owner: WalletOwner,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub settlement_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn credit(owner: WalletOwner, amount: Decimal, settlement_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            kind: owner.entry_kind(),
            amount,
            settlement_id,
            created_at: Utc::now(),
        }
    }
}

/// `balance` is credits minus approved withdrawals; `pending_withdrawals` is only
/// subtracted for availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalance {
    pub owner: WalletOwner,
    pub balance: Decimal,
    pub pending_withdrawals: Decimal,
    pub total_earned: Decimal,
    pub total_withdrawn: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    pub fn empty(owner: WalletOwner) -> Self {
        Self {
            owner,
            balance: Decimal::ZERO,
            pending_withdrawals: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn available(&self) -> Decimal {
        self.balance - self.pending_withdrawals
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub payee: WalletOwner,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub admin_note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwningEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
}

impl OwningEntity {
    pub fn is_self_signup(&self) -> bool {
        self.created_by == self.user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salesperson {
    pub id: Uuid,
    pub commission_percent: Decimal,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesManager {
    pub id: Uuid,
    pub commission_percent: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Admin,
    SalesManager,
    Salesperson,
    Member,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SalesManager => "sales_manager",
            Self::Salesperson => "salesperson",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Self::Admin),
            "sales_manager" => Some(Self::SalesManager),
            "salesperson" => Some(Self::Salesperson),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn plan_duration_adds_calendar_months() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap();
        let end = PlanDuration::OneMonth.end_from(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap());

        let end = PlanDuration::TwelveMonths.end_from(start).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap());
    }

    #[test]
    fn plan_duration_rejects_unsupported_lengths() {
        assert!(PlanDuration::from_months(2).is_none());
        assert!(serde_json::from_str::<PlanDuration>("5").is_err());
        assert_eq!(
            serde_json::from_str::<PlanDuration>("6").unwrap(),
            PlanDuration::SixMonths
        );
    }

    #[test]
    fn wallet_owner_serializes_with_role_tag() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(WalletOwner::Salesperson(id)).unwrap();
        assert_eq!(json["role"], "salesperson");
        assert_eq!(json["id"], id.to_string());

        let admin = serde_json::to_value(WalletOwner::Admin).unwrap();
        assert_eq!(admin["role"], "admin");
        assert_eq!(WalletOwner::Admin.id(), ADMIN_WALLET_ID);
    }

    #[test]
    fn request_patch_only_touches_provided_fields() {
        let now = Utc::now();
        let mut request = SubscriptionRequest {
            id: Uuid::new_v4(),
            subject: Subject::new(SubjectKind::CompanyBranch, Uuid::new_v4()),
            plan_id: Uuid::new_v4(),
            amount: Decimal::new(10000, 2),
            currency: "XAF".to_string(),
            correlation_id: "corr-1".to_string(),
            mode: PurchaseMode::Gateway,
            status: RequestStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            collect_url: Some("https://pay.example/1".to_string()),
            failure_reason: None,
            admin_note: None,
            requested_at: now,
            paid_at: None,
            processed_at: None,
        };

        RequestPatch {
            payment_status: Some(PaymentStatus::Success),
            paid_at: Some(now),
            ..RequestPatch::default()
        }
        .apply(&mut request);

        assert_eq!(request.payment_status, PaymentStatus::Success);
        assert_eq!(request.paid_at, Some(now));
        assert_eq!(request.collect_url.as_deref(), Some("https://pay.example/1"));
        assert!(request.is_settled());
    }

    #[test]
    fn wallet_availability_subtracts_reservations() {
        let mut wallet = WalletBalance::empty(WalletOwner::Admin);
        wallet.balance = Decimal::new(500, 0);
        wallet.pending_withdrawals = Decimal::new(120, 0);
        assert_eq!(wallet.available(), Decimal::new(380, 0));
    }
}
