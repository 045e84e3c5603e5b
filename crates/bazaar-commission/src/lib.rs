use bazaar_core::{AccountRole, Directory, OwningEntity, WalletOwner};
use rust_decimal::Decimal;
use tracing::warn;

pub use bazaar_core::{CommissionPolicy, Share, SplitPlan};

fn hundred() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn share_of(price: Decimal, percent: Decimal) -> Decimal {
    (price * percent / hundred()).round_dp(2)
}

fn percent_of(price: Decimal, amount: Decimal) -> Decimal {
    if price.is_zero() {
        Decimal::ZERO
    } else {
        (amount * hundred() / price).round_dp(4)
    }
}

fn valid_percent(percent: Decimal) -> bool {
    percent >= Decimal::ZERO && percent <= hundred()
}

pub fn split(policy: CommissionPolicy, price: Decimal) -> SplitPlan {
    let shares = match &policy {
        CommissionPolicy::SelfSignup | CommissionPolicy::Unresolved { .. } => vec![Share {
            payee: WalletOwner::Admin,
            percent: hundred(),
            amount: price,
        }],
        CommissionPolicy::AdminSalesperson {
            salesperson,
            percent,
        } => {
            let salesperson_amount = share_of(price, *percent);
            vec![
                Share {
                    payee: WalletOwner::Salesperson(*salesperson),
                    percent: *percent,
                    amount: salesperson_amount,
                },
                Share {
                    payee: WalletOwner::Admin,
                    percent: hundred() - *percent,
                    amount: price - salesperson_amount,
                },
            ]
        }
        CommissionPolicy::ManagedSalesperson {
            salesperson,
            salesperson_percent,
            manager,
            manager_percent,
        } => {
            let salesperson_amount = share_of(price, *salesperson_percent);
            let manager_amount = share_of(price, *manager_percent);
            let admin_amount = (price - salesperson_amount - manager_amount).max(Decimal::ZERO);
            vec![
                Share {
                    payee: WalletOwner::Salesperson(*salesperson),
                    percent: *salesperson_percent,
                    amount: salesperson_amount,
                },
                Share {
                    payee: WalletOwner::SalesManager(*manager),
                    percent: *manager_percent,
                    amount: manager_amount,
                },
                Share {
                    payee: WalletOwner::Admin,
                    percent: percent_of(price, admin_amount),
                    amount: admin_amount,
                },
            ]
        }
    };

    SplitPlan {
        price,
        policy,
        shares,
    }
}

/// Walks the creation chain of `entity`. Missing records degrade to
/// [`CommissionPolicy::Unresolved`]; only store failures are errors.
pub async fn resolve_policy<D>(directory: &D, entity: &OwningEntity) -> anyhow::Result<CommissionPolicy>
where
    D: Directory + ?Sized,
{
    if entity.is_self_signup() {
        return Ok(CommissionPolicy::SelfSignup);
    }

    let Some(salesperson) = directory.salesperson(entity.created_by).await? else {
        warn!(
            "commission policy unresolved: creator {} of entity {} is not a salesperson",
            entity.created_by, entity.id
        );
        return Ok(CommissionPolicy::Unresolved {
            reason: format!("creator {} is not a salesperson", entity.created_by),
        });
    };

    if !valid_percent(salesperson.commission_percent) {
        warn!(
            "commission policy unresolved: salesperson {} has percent {} outside 0..=100",
            salesperson.id, salesperson.commission_percent
        );
        return Ok(CommissionPolicy::Unresolved {
            reason: format!("salesperson {} has an invalid commission percent", salesperson.id),
        });
    }

    let creator_role = directory.account_role(salesperson.created_by).await?;
    let manager = match creator_role {
        Some(AccountRole::SalesManager) => directory.sales_manager(salesperson.created_by).await?,
        _ => None,
    };
    if let Some(manager) = manager {
        if !valid_percent(manager.commission_percent) {
            warn!(
                "sales manager {} has percent {} outside 0..=100, settling as admin-created",
                manager.id, manager.commission_percent
            );
        } else {
            return Ok(CommissionPolicy::ManagedSalesperson {
                salesperson: salesperson.id,
                salesperson_percent: salesperson.commission_percent,
                manager: manager.id,
                manager_percent: manager.commission_percent,
            });
        }
    }

    if creator_role != Some(AccountRole::Admin) {
        warn!(
            "salesperson {} creator {} resolved to {:?}, settling as admin-created",
            salesperson.id, salesperson.created_by, creator_role
        );
    }

    Ok(CommissionPolicy::AdminSalesperson {
        salesperson: salesperson.id,
        percent: salesperson.commission_percent,
    })
}

#[cfg(test)]
mod tests {
    use bazaar_core::{SalesManager, Salesperson};
    use bazaar_store::MemoryStore;
    use uuid::Uuid;

    use super::*;

    fn price() -> Decimal {
        Decimal::new(10000, 2)
    }

    #[test]
    fn self_signup_sends_everything_to_admin() {
        let plan = split(CommissionPolicy::SelfSignup, price());
        assert_eq!(plan.shares.len(), 1);
        assert_eq!(plan.admin_amount(), price());
        assert!(!plan.policy.records_splits());
    }

    #[test]
    fn admin_created_salesperson_takes_percent_and_admin_the_remainder() {
        let salesperson = Uuid::new_v4();
        let plan = split(
            CommissionPolicy::AdminSalesperson {
                salesperson,
                percent: Decimal::new(30, 0),
            },
            price(),
        );

        let salesperson_share = plan.share_for(WalletOwner::Salesperson(salesperson)).unwrap();
        assert_eq!(salesperson_share.amount, Decimal::new(3000, 2));
        assert_eq!(plan.admin_amount(), Decimal::new(7000, 2));
        assert_eq!(plan.share_for(WalletOwner::Admin).unwrap().percent, Decimal::new(70, 0));
        assert_eq!(plan.total(), price());
    }

    #[test]
    fn admin_remainder_absorbs_rounding() {
        let plan = split(
            CommissionPolicy::AdminSalesperson {
                salesperson: Uuid::new_v4(),
                percent: Decimal::new(3333, 2),
            },
            Decimal::new(999, 2),
        );
        assert_eq!(plan.total(), Decimal::new(999, 2));
    }

    #[test]
    fn managed_salesperson_percentages_are_independent_of_each_other() {
        let salesperson = Uuid::new_v4();
        let manager = Uuid::new_v4();
        let plan = split(
            CommissionPolicy::ManagedSalesperson {
                salesperson,
                salesperson_percent: Decimal::new(20, 0),
                manager,
                manager_percent: Decimal::new(15, 0),
            },
            price(),
        );

        assert_eq!(
            plan.share_for(WalletOwner::Salesperson(salesperson)).unwrap().amount,
            Decimal::new(2000, 2)
        );
        assert_eq!(
            plan.share_for(WalletOwner::SalesManager(manager)).unwrap().amount,
            Decimal::new(1500, 2)
        );
        assert_eq!(plan.admin_amount(), Decimal::new(6500, 2));
        assert_eq!(
            plan.shares.iter().map(|share| share.payee.role()).collect::<Vec<_>>(),
            vec![
                bazaar_core::PayeeRole::Salesperson,
                bazaar_core::PayeeRole::SalesManager,
                bazaar_core::PayeeRole::Admin
            ]
        );
    }

    #[test]
    fn managed_salesperson_admin_share_floors_at_zero() {
        let plan = split(
            CommissionPolicy::ManagedSalesperson {
                salesperson: Uuid::new_v4(),
                salesperson_percent: Decimal::new(70, 0),
                manager: Uuid::new_v4(),
                manager_percent: Decimal::new(50, 0),
            },
            price(),
        );
        assert_eq!(plan.admin_amount(), Decimal::ZERO);
        assert_eq!(plan.total(), Decimal::new(12000, 2));
    }

    async fn directory_with_chain(
        creator_role: AccountRole,
    ) -> (MemoryStore, OwningEntity, Uuid, Uuid) {
        let store = MemoryStore::new();
        let creator = Uuid::new_v4();
        let salesperson = Uuid::new_v4();

        match creator_role {
            AccountRole::SalesManager => {
                store
                    .put_sales_manager(SalesManager {
                        id: creator,
                        commission_percent: Decimal::new(10, 0),
                    })
                    .await
            }
            role => store.put_account_role(creator, role).await,
        }
        store
            .put_salesperson(Salesperson {
                id: salesperson,
                commission_percent: Decimal::new(25, 0),
                created_by: creator,
            })
            .await;

        let entity = OwningEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_by: salesperson,
        };
        (store, entity, salesperson, creator)
    }

    #[tokio::test]
    async fn resolves_self_signup() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let entity = OwningEntity {
            id: Uuid::new_v4(),
            user_id: user,
            created_by: user,
        };
        assert_eq!(
            resolve_policy(&store, &entity).await.unwrap(),
            CommissionPolicy::SelfSignup
        );
    }

    #[tokio::test]
    async fn resolves_admin_created_salesperson() {
        let (store, entity, salesperson, _) = directory_with_chain(AccountRole::Admin).await;
        assert_eq!(
            resolve_policy(&store, &entity).await.unwrap(),
            CommissionPolicy::AdminSalesperson {
                salesperson,
                percent: Decimal::new(25, 0),
            }
        );
    }

    #[tokio::test]
    async fn resolves_manager_created_salesperson() {
        let (store, entity, salesperson, manager) =
            directory_with_chain(AccountRole::SalesManager).await;
        assert_eq!(
            resolve_policy(&store, &entity).await.unwrap(),
            CommissionPolicy::ManagedSalesperson {
                salesperson,
                salesperson_percent: Decimal::new(25, 0),
                manager,
                manager_percent: Decimal::new(10, 0),
            }
        );
    }

    #[tokio::test]
    async fn unknown_salesperson_falls_back_to_admin() {
        let store = MemoryStore::new();
        let entity = OwningEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
        };

        let policy = resolve_policy(&store, &entity).await.unwrap();
        assert!(matches!(policy, CommissionPolicy::Unresolved { .. }));
        assert_eq!(split(policy, price()).admin_amount(), price());
    }
}
