use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use weekend_slots::generator::{self, SlotGenerator};
use weekend_slots::notify::NotifyHub;
use weekend_slots::store::InMemoryRequestStore;
use weekend_slots::{maintenance, observability, Config, ScheduleViewAssembler, SlotLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let journal_path = config.data_dir.join("slots.journal");
    let notify = Arc::new(NotifyHub::new());
    let ledger = Arc::new(SlotLedger::open(journal_path.clone(), notify.clone())?);

    let requests = Arc::new(InMemoryRequestStore::new());
    let views = ScheduleViewAssembler::new(ledger.clone(), requests, config.upcoming_limit, config.store_timeout);

    info!("weekend-slots started");
    info!("  journal: {}", journal_path.display());
    info!("  slots on record: {}", ledger.slot_count());
    info!("  horizon: {} weeks, refresh every {:?}", config.horizon_weeks, config.regenerate_interval);
    info!("  entry policy: {:?}", config.entry_policy);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Generation and compaction run detached; their failures are logged, never fatal.
    let slot_generator = Arc::new(SlotGenerator::new(ledger.clone(), config.slot_capacity));
    tokio::spawn(generator::run_slot_refresh(
        slot_generator,
        config.horizon_weeks,
        config.regenerate_interval,
    ));
    tokio::spawn(maintenance::run_compactor(ledger.clone(), config.compact_threshold));

    // Log every ledger event until shutdown.
    let mut events = notify.subscribe_all();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!("schedule event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("no SIGTERM handler ({e}), waiting for ctrl-c only");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");
    let upcoming = views.get_upcoming_slots().await;
    info!("{} upcoming slots on record", upcoming.len());
    if let Err(e) = ledger.compact().await {
        tracing::warn!("final journal compaction failed: {e}");
    }
    info!("weekend-slots stopped");
    Ok(())
}
