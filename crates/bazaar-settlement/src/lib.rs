pub mod confirmation;
pub mod lifecycle;
pub mod marketplace;
mod outbox;
pub mod purchase;
pub mod requests;
pub mod settings;
pub mod withdrawals;

pub use confirmation::{ConfirmOutcome, PaymentConfirmationProcessor};
pub use lifecycle::{CurrentPlan, RemainingTime, RenewalEligibility, SubscriptionLifecycle};
pub use marketplace::Marketplace;
pub use outbox::Outbox;
pub use purchase::{PurchaseDesk, PurchaseReceipt};
pub use requests::RequestRepository;
pub use settings::SettlementSettings;
pub use withdrawals::WithdrawalProcessor;
