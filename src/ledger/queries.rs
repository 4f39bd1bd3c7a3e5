use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::SlotLedger;

impl SlotLedger {
    pub async fn find_by_id(&self, id: Ulid) -> Option<WeekendSlot> {
        let shared = self.get_slot(&id)?;
        let guard = shared.read().await;
        Some(guard.slot.clone())
    }

    /// The slot for exactly `date`, if one has been created.
    pub async fn find_by_date(&self, date: NaiveDate) -> Option<WeekendSlot> {
        let id = self.by_date.get(&date).map(|e| *e.value())?;
        self.find_by_id(id).await
    }

    /// Slots dated `today` or later, ascending by date, at most `limit`.
    pub async fn list_upcoming(&self, today: NaiveDate, limit: usize) -> Vec<WeekendSlot> {
        let mut dated: Vec<(NaiveDate, Ulid)> = self
            .by_date
            .iter()
            .filter(|e| *e.key() >= today)
            .map(|e| (*e.key(), *e.value()))
            .collect();
        dated.sort_unstable_by_key(|(date, _)| *date);

        let mut slots = Vec::with_capacity(limit.min(dated.len()));
        for (_, id) in dated {
            if slots.len() == limit {
                break;
            }
            // A date may be claimed by a create whose journal write is still in flight.
            if let Some(slot) = self.find_by_id(id).await {
                slots.push(slot);
            }
        }
        slots
    }

    /// Entries booked against a slot, ascending by start time then booking order.
    pub async fn entries_for_slot(&self, slot_id: Ulid) -> Vec<ScheduleEntry> {
        let Some(shared) = self.get_slot(&slot_id) else {
            return Vec::new();
        };
        let mut entries = shared.read().await.entries.clone();
        entries.sort_by_key(|e| e.start_time);
        entries
    }

    pub async fn entries_for_request(&self, request_id: Ulid) -> Vec<ScheduleEntry> {
        let entry_ids: Vec<Ulid> = self
            .request_entries
            .get(&request_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut entries = Vec::with_capacity(entry_ids.len());
        for entry_id in entry_ids {
            if let Some(entry) = self.find_entry(entry_id).await {
                entries.push(entry);
            }
        }
        entries
    }

    pub async fn find_entry(&self, entry_id: Ulid) -> Option<ScheduleEntry> {
        let slot_id = self.entry_to_slot.get(&entry_id).map(|e| *e.value())?;
        let shared = self.get_slot(&slot_id)?;
        let guard = shared.read().await;
        guard.entries.iter().find(|e| e.id == entry_id).cloned()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
