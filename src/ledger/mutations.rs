use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::error::ScheduleError;
use crate::model::*;

use super::{JournalCommand, SlotLedger, SlotTxn};

impl SlotLedger {
    /// Create the slot for `date`. The date index is claimed before anything is
    /// journaled, so two concurrent creates for one date cannot both succeed.
    pub async fn create_slot(
        &self,
        date: NaiveDate,
        capacity: SlotCapacity,
        now: DateTime<Utc>,
    ) -> Result<WeekendSlot, ScheduleError> {
        let day_of_week = DayOfWeek::of(date).ok_or(ScheduleError::NotAWeekend(date))?;
        let id = Ulid::new();
        match self.by_date.entry(date) {
            Entry::Occupied(_) => return Err(ScheduleError::SlotAlreadyExists(date)),
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let slot = WeekendSlot::new(id, date, day_of_week, capacity, now);
        let event = ScheduleEvent::SlotCreated { slot: slot.clone() };
        if let Err(e) = self.journal_append(&event).await {
            self.by_date.remove(&date);
            return Err(e);
        }
        self.insert_slot(slot.clone());
        self.notify.send(&event);
        metrics::gauge!(crate::observability::SLOTS_ACTIVE).set(self.slots.len() as f64);
        Ok(slot)
    }

    /// Take the slot's exclusive lock, waiting at most `wait`. A wait that runs
    /// out means another booking is holding the slot: `ConcurrencyConflict`.
    pub async fn lock_slot(&self, slot_id: Ulid, wait: Duration) -> Result<SlotTxn, ScheduleError> {
        let shared = self.get_slot(&slot_id).ok_or(ScheduleError::SlotNotFound(slot_id))?;
        let guard = tokio::time::timeout(wait, shared.write_owned())
            .await
            .map_err(|_| ScheduleError::ConcurrencyConflict(slot_id))?;
        Ok(SlotTxn { guard })
    }

    /// Charge `entry.hours` and one project to the held slot and record the
    /// entry, as one journal record. The capacity check runs against the same
    /// locked counters the caller read.
    pub async fn commit_booking(&self, txn: &mut SlotTxn, entry: ScheduleEntry) -> Result<SlotStatus, ScheduleError> {
        debug_assert_eq!(entry.slot_id, txn.slot().id);
        let event = ScheduleEvent::BookingCommitted { entry };
        self.persist_and_apply(&mut txn.guard, &event).await?;
        Ok(txn.slot().status)
    }

    /// Compensate a committed booking: drop the entry and release its capacity.
    pub async fn revert_booking(&self, txn: &mut SlotTxn, entry_id: Ulid) -> Result<SlotStatus, ScheduleError> {
        let request_id = txn
            .entries()
            .iter()
            .find(|e| e.id == entry_id)
            .map(|e| e.request_id)
            .ok_or(ScheduleError::EntryNotFound(entry_id))?;
        let event = ScheduleEvent::BookingReverted {
            entry_id,
            slot_id: txn.slot().id,
            request_id,
        };
        self.persist_and_apply(&mut txn.guard, &event).await?;
        Ok(txn.slot().status)
    }

    /// Apply admin changes to an entry. Slot capacity is not touched. The slot
    /// lock wait is bounded by `wait`, as in `lock_slot`.
    pub async fn update_entry(
        &self,
        entry_id: Ulid,
        update: EntryUpdate,
        now: DateTime<Utc>,
        wait: Duration,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let slot_id = self
            .entry_to_slot
            .get(&entry_id)
            .map(|e| *e.value())
            .ok_or(ScheduleError::EntryNotFound(entry_id))?;
        let mut txn = self.lock_slot(slot_id, wait).await?;

        let mut entry = txn
            .entries()
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or(ScheduleError::EntryNotFound(entry_id))?;
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(builder_id) = update.builder_id {
            entry.builder_id = Some(builder_id);
        }
        if let Some(notes) = update.notes {
            entry.notes = notes;
        }
        entry.updated_at = now;

        let event = ScheduleEvent::EntryUpdated { entry: entry.clone() };
        self.persist_and_apply(&mut txn.guard, &event).await?;
        Ok(entry)
    }

    /// Rewrite the journal as the minimal record set for the committed state.
    pub async fn compact(&self) -> Result<(), ScheduleError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { response: tx })
            .await
            .map_err(|_| ScheduleError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| ScheduleError::Journal("journal writer dropped response".into()))?
            .map_err(|e| ScheduleError::Journal(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
