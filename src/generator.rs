use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::calendar;
use crate::error::ScheduleError;
use crate::ledger::SlotLedger;
use crate::model::SlotCapacity;

/// Keeps the ledger stocked with one slot per weekend day over a rolling horizon.
pub struct SlotGenerator {
    ledger: Arc<SlotLedger>,
    capacity: SlotCapacity,
}

impl SlotGenerator {
    pub fn new(ledger: Arc<SlotLedger>, capacity: SlotCapacity) -> Self {
        Self { ledger, capacity }
    }

    /// Ensure slots exist for the next `horizon_weeks` weekends, counted from
    /// the host's local date. Returns how many slots were created.
    pub async fn generate_slots(&self, horizon_weeks: u32) -> Result<usize, ScheduleError> {
        self.generate_slots_from(calendar::today(), horizon_weeks).await
    }

    pub async fn generate_slots_from(&self, today: NaiveDate, horizon_weeks: u32) -> Result<usize, ScheduleError> {
        let mut created = 0;
        for (saturday, sunday) in calendar::upcoming_weekends(today, horizon_weeks) {
            for date in [saturday, sunday] {
                if self.ensure_slot(date).await? {
                    created += 1;
                }
            }
        }
        if created > 0 {
            metrics::counter!(crate::observability::SLOTS_CREATED_TOTAL).increment(created as u64);
            info!("generated {created} weekend slots (horizon {horizon_weeks} weeks from {today})");
        }
        Ok(created)
    }

    /// Lookup-then-create. Losing a create race to another generator is a skip.
    async fn ensure_slot(&self, date: NaiveDate) -> Result<bool, ScheduleError> {
        if self.ledger.find_by_date(date).await.is_some() {
            return Ok(false);
        }
        match self.ledger.create_slot(date, self.capacity, Utc::now()).await {
            Ok(slot) => {
                debug!("created slot {} for {date}", slot.id);
                Ok(true)
            }
            Err(ScheduleError::SlotAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Background task: generate at startup, then every `interval`.
pub async fn run_slot_refresh(generator: Arc<SlotGenerator>, horizon_weeks: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = generator.generate_slots(horizon_weeks).await {
            warn!("slot generation failed: {e}");
        }
    }
}
