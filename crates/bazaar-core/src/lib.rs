pub mod commission;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;

pub use commission::{CommissionPolicy, Share, SplitPlan};
pub use error::{ErrorKind, SettlementError, SettlementResult};
pub use events::{SettlementEvent, SettlementEventKind};
pub use models::{
    AccountRole, CommissionSplit, EntryKind, LedgerEntry, OwningEntity, PayeeRole,
    PaymentStatus, Plan, PlanDuration, PurchaseMode, RequestPatch, RequestStatus, SalesManager,
    Salesperson, Subject, SubjectKind, Subscription, SubscriptionRequest, SubscriptionStatus,
    WalletBalance, WalletOwner, WithdrawalRequest, WithdrawalStatus,
};
pub use storage::{
    CommissionStore, Directory, Guarded, LedgerStore, MarketplaceStore, OpenRequestInsert,
    OperationalStatusStore, RequestStore, SubscriptionStore, WithdrawalReservation,
    WithdrawalStore,
};
