use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::config::EntryPolicy;
use crate::error::ScheduleError;
use crate::ledger::{SlotLedger, SlotTxn};
use crate::model::*;
use crate::observability;
use crate::store::{with_deadline, RequestStore, UserStore};

/// Commits build requests to slots.
///
/// A booking is a small saga: the entry and the slot's counters change together
/// in one journal record, then the request is marked scheduled. If that last
/// step fails the booking is reverted before the error is returned.
pub struct BookingEngine {
    ledger: Arc<SlotLedger>,
    requests: Arc<dyn RequestStore>,
    users: Arc<dyn UserStore>,
    policy: EntryPolicy,
    store_timeout: Duration,
    /// Serializes bookings of the same request. Taken before any slot lock.
    request_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl BookingEngine {
    pub fn new(
        ledger: Arc<SlotLedger>,
        requests: Arc<dyn RequestStore>,
        users: Arc<dyn UserStore>,
        policy: EntryPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            requests,
            users,
            policy,
            store_timeout,
            request_locks: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<SlotLedger> {
        &self.ledger
    }

    pub async fn schedule_request(&self, request_id: Ulid, slot_id: Ulid, hours: u32) -> Result<ScheduleEntry, ScheduleError> {
        self.schedule_request_within(request_id, slot_id, hours, self.store_timeout).await
    }

    /// Like `schedule_request`, with `timeout` bounding every lock wait and
    /// store call instead of the configured default.
    pub async fn schedule_request_within(
        &self,
        request_id: Ulid,
        slot_id: Ulid,
        hours: u32,
        timeout: Duration,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let start = Instant::now();
        let result = self.book(request_id, slot_id, hours, timeout).await;
        self.request_locks
            .remove_if(&request_id, |_, lock| Arc::strong_count(lock) == 1);

        let outcome = observability::outcome_label(&result.as_ref().map(|_| ()));
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(observability::BOOKING_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        result
    }

    async fn book(&self, request_id: Ulid, slot_id: Ulid, hours: u32, timeout: Duration) -> Result<ScheduleEntry, ScheduleError> {
        if hours == 0 {
            return Err(ScheduleError::InvalidHours(hours));
        }

        let request_lock = self.request_locks.entry(request_id).or_default().clone();
        let request_guard = tokio::time::timeout(timeout, request_lock.lock_owned())
            .await
            .map_err(|_| ScheduleError::RequestBusy(request_id))?;

        if self.policy == EntryPolicy::Single
            && self.ledger.entries_for_request(request_id).await.iter().any(ScheduleEntry::is_active)
        {
            return Err(ScheduleError::RequestAlreadyScheduled(request_id));
        }

        let txn = self.ledger.lock_slot(slot_id, timeout).await?;
        let slot = txn.slot().clone();
        if slot.status == SlotStatus::Full {
            return Err(ScheduleError::SlotFull(slot_id));
        }
        if hours > slot.remaining_hours() {
            return Err(ScheduleError::InsufficientCapacity {
                slot_id,
                requested: hours,
                remaining: slot.remaining_hours(),
            });
        }

        let request = with_deadline("find_request", timeout, self.requests.find_by_id(request_id))
            .await?
            .ok_or(ScheduleError::RequestNotFound(request_id))?;
        let entry = ScheduleEntry::for_slot(request_id, &slot, hours, Utc::now())?;

        // From the first journal write on, the saga runs in its own task with
        // both locks, so a dropped caller cannot leave it half applied.
        let saga = tokio::spawn(commit_booking_saga(
            self.ledger.clone(),
            self.requests.clone(),
            txn,
            request_guard,
            request,
            entry,
            timeout,
        ));
        saga.await.map_err(|e| ScheduleError::TaskFailed(e.to_string()))?
    }

    /// Admin changes to an entry. A new builder must exist in the user store.
    pub async fn update_entry(&self, entry_id: Ulid, update: EntryUpdate) -> Result<ScheduleEntry, ScheduleError> {
        if let Some(builder_id) = update.builder_id {
            let exists = with_deadline("user_exists", self.store_timeout, self.users.user_exists(builder_id)).await?;
            if !exists {
                return Err(ScheduleError::UserNotFound(builder_id));
            }
        }
        let ledger = self.ledger.clone();
        let wait = self.store_timeout;
        let entry = tokio::spawn(async move { ledger.update_entry(entry_id, update, Utc::now(), wait).await })
            .await
            .map_err(|e| ScheduleError::TaskFailed(e.to_string()))??;
        info!("updated schedule entry {entry_id}: status {:?}", entry.status);
        Ok(entry)
    }
}

/// Commit the entry, mark the request scheduled, and revert the entry if the
/// request update fails. Both locks are released when this returns.
async fn commit_booking_saga(
    ledger: Arc<SlotLedger>,
    requests: Arc<dyn RequestStore>,
    mut txn: SlotTxn,
    _request_guard: OwnedMutexGuard<()>,
    mut request: BuildRequest,
    entry: ScheduleEntry,
    timeout: Duration,
) -> Result<ScheduleEntry, ScheduleError> {
    let request_id = request.id;
    let slot_id = entry.slot_id;
    let status = ledger.commit_booking(&mut txn, entry.clone()).await?;

    request.status = RequestStatus::Scheduled;
    request.scheduled_weekend = Some(txn.slot().date);
    request.updated_at = entry.created_at;
    if let Err(e) = with_deadline("update_request", timeout, requests.update(&request)).await {
        metrics::counter!(observability::BOOKINGS_REVERTED_TOTAL).increment(1);
        match ledger.revert_booking(&mut txn, entry.id).await {
            Ok(_) => warn!("request {request_id} update failed, booking {} on slot {slot_id} reverted: {e}", entry.id),
            Err(revert_err) => error!(
                "request {request_id} update failed ({e}) and booking {} on slot {slot_id} could not be reverted: {revert_err}",
                entry.id
            ),
        }
        return Err(e);
    }

    info!(
        "scheduled request {request_id} on {} ({}) for {}h, slot now {status:?}",
        txn.slot().date,
        txn.slot().day_of_week.as_str(),
        entry.hours
    );
    Ok(entry)
}
