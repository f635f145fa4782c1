//! Banking demo.
//!
//! Opens two accounts, moves money around, waits for the balances view to
//! catch up, then drops the view and rebuilds it from the global log.
//!
//! ```bash
//! RUST_LOG=banking=debug cargo run -p banking
//! # With a configuration file (any subset of EngineConfig fields):
//! EVENTLOOM_CONFIG=engine.json cargo run -p banking
//! ```

use anyhow::Context;
use banking::BalancesView;
use eventloom_core::command::CommandEnvelope;
use eventloom_core::projection::Projection;
use eventloom_core::stream::TenantId;
use eventloom_core::type_registry::TypeRegistry;
use eventloom_projections::ViewsRebuilder;
use eventloom_runtime::completion::CompletionTracker;
use eventloom_runtime::metrics::MetricsServer;
use eventloom_runtime::{Engine, EngineConfig};
use eventloom_testing::fixtures::{AccountCommand, AccountId, BankAccount};
use eventloom_testing::{InMemoryEventBus, InMemoryEventStore, InMemorySnapshotBackend};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<EngineConfig> {
    let Ok(path) = std::env::var("EVENTLOOM_CONFIG") else {
        // Small batches so the rebuild shows progress.
        return Ok(EngineConfig::default().with_rebuild_batch_size(2));
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("banking=debug,eventloom_runtime=debug")),
        )
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9000".parse()?);
    metrics.start()?;

    let config = load_config()?;
    tracing::info!(?config, "Configuration loaded");

    let tracker = Arc::new(CompletionTracker::new());
    let balances = Arc::new(BalancesView::new());
    let bus = InMemoryEventBus::new()
        .with_completion_tracker(Arc::clone(&tracker))
        .with_projection(balances.clone());
    let engine = Engine::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemorySnapshotBackend::new()),
        Arc::new(bus),
        config,
    )
    .with_completion_tracker(tracker);
    engine.start().await?;

    let alice = AccountId::generate();
    let bob = AccountId::generate();
    let commands = [
        (alice, AccountCommand::Open { owner: "Alice".to_string() }),
        (bob, AccountCommand::Open { owner: "Bob".to_string() }),
        (alice, AccountCommand::Deposit { amount: 100_000 }),
        (bob, AccountCommand::Deposit { amount: 50_000 }),
        (bob, AccountCommand::Withdraw { amount: 5_000 }),
        // Insufficient funds: accepted, nothing happens.
        (bob, AccountCommand::Withdraw { amount: 1_000_000 }),
        // Rejected: deposits must be positive.
        (alice, AccountCommand::Deposit { amount: 0 }),
    ];

    for (id, command) in commands {
        let result = engine
            .send_and_wait::<BankAccount>(&CommandEnvelope::new(id, command), None)
            .await?;
        match result.error() {
            Some(reason) => tracing::warn!(account = %id, reason, "Command rejected"),
            None => tracing::info!(
                account = %id,
                changed = result.has_changes(),
                version = %result.resulting_version(),
                "Command handled"
            ),
        }
    }

    for id in [alice, bob] {
        let state = engine.get_state::<BankAccount>(&TenantId::empty(), &id).await?;
        tracing::info!(account = %id, owner = ?state.owner, balance = state.balance, "Aggregate state");
    }
    tracing::info!(total = balances.total(), accounts = balances.len(), "Balances view");

    let mut registry = TypeRegistry::new();
    registry.register::<BankAccount>()?;
    let rebuilder = ViewsRebuilder::for_engine(&engine, Arc::new(registry))
        .with_reset(vec![balances.clone() as Arc<dyn Projection>]);

    let mut progress = rebuilder.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(batch) = progress.recv().await {
            tracing::debug!(batch = batch.batch, processed = batch.events_processed, end = %batch.end, "Rebuild progress");
        }
    });

    let summary = rebuilder.rebuild(engine.config().rebuild_batch_size).await?;
    drop(rebuilder);
    let _ = watcher.await;

    tracing::info!(
        batches = summary.batches,
        events = summary.events,
        total = balances.total(),
        "Balances view rebuilt"
    );

    if let Some(text) = metrics.render() {
        println!("{text}");
    }
    Ok(())
}
