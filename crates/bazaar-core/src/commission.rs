use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::WalletOwner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CommissionPolicy {
    SelfSignup,
    AdminSalesperson { salesperson: Uuid, percent: Decimal },
    /// Both percentages apply to the price independently; the admin takes what is left,
    /// floored at zero.
    ManagedSalesperson {
        salesperson: Uuid,
        salesperson_percent: Decimal,
        manager: Uuid,
        manager_percent: Decimal,
    },
    Unresolved { reason: String },
}

impl CommissionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelfSignup => "self_signup",
            Self::AdminSalesperson { .. } => "admin_salesperson",
            Self::ManagedSalesperson { .. } => "managed_salesperson",
            Self::Unresolved { .. } => "unresolved",
        }
    }

    pub fn records_splits(&self) -> bool {
        matches!(
            self,
            Self::AdminSalesperson { .. } | Self::ManagedSalesperson { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub payee: WalletOwner,
    pub percent: Decimal,
    pub amount: Decimal,
}

/// Ordered payee shares for one price: salesperson, sales manager, then admin.
///
/// Pinned on the subscription when a settlement starts, so every later posting of that
/// settlement credits the same payees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub price: Decimal,
    pub policy: CommissionPolicy,
    pub shares: Vec<Share>,
}

impl SplitPlan {
    pub fn share_for(&self, payee: WalletOwner) -> Option<&Share> {
        self.shares.iter().find(|share| share.payee == payee)
    }

    pub fn admin_amount(&self) -> Decimal {
        self.share_for(WalletOwner::Admin)
            .map(|share| share.amount)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        self.shares.iter().map(|share| share.amount).sum()
    }
}
