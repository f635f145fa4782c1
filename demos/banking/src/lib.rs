//! Read side of the banking demo.
//!
//! [`BalancesView`] keeps the balance of every open account. It is fed live
//! by the event bus and can be dropped and rebuilt from the global log.

use eventloom_core::projection::{Projection, ProjectionFuture};
use eventloom_core::type_registry::AnyEnvelope;
use eventloom_testing::fixtures::{AccountEvent, AccountId};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// One row of the balances view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceRow {
    /// Account holder.
    pub owner: String,
    /// Balance in cents.
    pub balance: u64,
}

/// Balances of open accounts, keyed by account id.
#[derive(Debug, Default)]
pub struct BalancesView {
    rows: Mutex<BTreeMap<String, BalanceRow>>,
}

impl BalancesView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Row of one account, if it is open.
    #[must_use]
    pub fn get(&self, id: &AccountId) -> Option<BalanceRow> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id.to_string())
            .cloned()
    }

    /// Sum of all open balances.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|row| row.balance)
            .sum()
    }

    /// Number of open accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no account is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, id: &AccountId, event: &AccountEvent) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let key = id.to_string();
        match event {
            AccountEvent::Opened { owner } => {
                rows.insert(
                    key,
                    BalanceRow {
                        owner: owner.clone(),
                        balance: 0,
                    },
                );
            },
            AccountEvent::Deposited { amount } => {
                if let Some(row) = rows.get_mut(&key) {
                    row.balance += amount;
                }
            },
            AccountEvent::Withdrawn { amount } => {
                if let Some(row) = rows.get_mut(&key) {
                    row.balance = row.balance.saturating_sub(*amount);
                }
            },
            AccountEvent::Closed => {
                rows.remove(&key);
            },
        }
    }
}

impl Projection for BalancesView {
    fn name(&self) -> &str {
        "balances"
    }

    fn handle<'a>(&'a self, envelope: &'a AnyEnvelope) -> ProjectionFuture<'a> {
        Box::pin(async move {
            // Other aggregates share the bus.
            if let Some(event) = envelope.downcast_ref::<AccountId, AccountEvent>() {
                self.apply(event.aggregate_id(), event.payload());
            }
            Ok(())
        })
    }

    fn reset(&self) -> ProjectionFuture<'_> {
        Box::pin(async move {
            self.rows.lock().unwrap_or_else(PoisonError::into_inner).clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use eventloom_core::command::CommandEnvelope;
    use eventloom_core::stream::TenantId;
    use eventloom_projections::ViewsRebuilder;
    use eventloom_runtime::{Engine, EngineConfig};
    use eventloom_core::type_registry::TypeRegistry;
    use eventloom_testing::fixtures::{AccountCommand, BankAccount};
    use eventloom_testing::{InMemoryEventBus, InMemoryEventStore, InMemorySnapshotBackend};
    use std::sync::Arc;

    #[tokio::test]
    async fn view_follows_commands_and_survives_rebuild() {
        let view = Arc::new(BalancesView::new());
        let engine = Engine::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySnapshotBackend::new()),
            Arc::new(InMemoryEventBus::new().with_projection(view.clone())),
            EngineConfig::default(),
        );
        engine.start().await.unwrap();

        let ada = AccountId::generate();
        let bob = AccountId::generate();
        for (id, command) in [
            (ada, AccountCommand::Open { owner: "ada".to_string() }),
            (ada, AccountCommand::Deposit { amount: 100 }),
            (bob, AccountCommand::Open { owner: "bob".to_string() }),
            (bob, AccountCommand::Deposit { amount: 40 }),
            (ada, AccountCommand::Withdraw { amount: 30 }),
            (bob, AccountCommand::Close),
        ] {
            engine
                .send::<BankAccount>(&CommandEnvelope::new(id, command))
                .await
                .unwrap();
        }

        let expected = BalanceRow {
            owner: "ada".to_string(),
            balance: 70,
        };
        assert_eq!(view.get(&ada), Some(expected.clone()));
        assert_eq!(view.get(&bob), None);
        assert_eq!(view.total(), 70);

        let mut registry = TypeRegistry::new();
        registry.register::<BankAccount>().unwrap();
        let summary = ViewsRebuilder::for_engine(&engine, Arc::new(registry))
            .with_reset(vec![view.clone() as Arc<dyn Projection>])
            .rebuild(4)
            .await
            .unwrap();

        assert_eq!(summary.events, 6);
        assert_eq!(view.len(), 1);
        assert_eq!(view.get(&ada), Some(expected));
        assert!(
            engine
                .get_state::<BankAccount>(&TenantId::empty(), &bob)
                .await
                .unwrap()
                .closed
        );
    }
}
