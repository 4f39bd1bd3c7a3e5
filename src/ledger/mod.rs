mod mutations;
mod queries;

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::error::ScheduleError;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

/// A slot and every entry booked against it. One lock guards both, so the
/// counters and the entries that account for them always change together.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub slot: WeekendSlot,
    /// In booking order.
    pub entries: Vec<ScheduleEntry>,
}

impl SlotState {
    /// Apply a booking-level event. On error the state is left untouched.
    pub(super) fn apply(&mut self, event: &ScheduleEvent) -> Result<(), ScheduleError> {
        match event {
            ScheduleEvent::BookingCommitted { entry } => {
                self.slot.apply_booking(i64::from(entry.hours), 1)?;
                self.entries.push(entry.clone());
            }
            ScheduleEvent::BookingReverted { entry_id, .. } => {
                let pos = self
                    .entries
                    .iter()
                    .position(|e| e.id == *entry_id)
                    .ok_or(ScheduleError::EntryNotFound(*entry_id))?;
                self.slot.apply_booking(-i64::from(self.entries[pos].hours), -1)?;
                self.entries.remove(pos);
            }
            ScheduleEvent::EntryUpdated { entry } => {
                let existing = self
                    .entries
                    .iter_mut()
                    .find(|e| e.id == entry.id)
                    .ok_or(ScheduleError::EntryNotFound(entry.id))?;
                *existing = entry.clone();
            }
            // Slot creation is handled at the map level.
            ScheduleEvent::SlotCreated { .. } => {}
        }
        Ok(())
    }
}

pub type SharedSlotState = Arc<RwLock<SlotState>>;

/// Exclusive hold on one slot. While it lives no other booking can read or
/// change the slot's counters.
pub struct SlotTxn {
    guard: OwnedRwLockWriteGuard<SlotState>,
}

impl SlotTxn {
    pub fn slot(&self) -> &WeekendSlot {
        &self.guard.slot
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.guard.entries
    }
}

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: ScheduleEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Committed state as the journal writer sees it. Compaction rewrites the log
/// from this copy, so it never races the in-memory ledger.
#[derive(Default)]
struct Committed {
    slots: BTreeMap<Ulid, (WeekendSlot, Vec<ScheduleEntry>)>,
}

impl Committed {
    fn apply(&mut self, event: &ScheduleEvent) {
        match event {
            ScheduleEvent::SlotCreated { slot } => {
                let mut fresh = slot.clone();
                fresh.booked_hours = 0;
                fresh.booked_projects = 0;
                fresh.status = SlotStatus::Available;
                self.slots.insert(slot.id, (fresh, Vec::new()));
            }
            ScheduleEvent::BookingCommitted { entry } => {
                if let Some((_, entries)) = self.slots.get_mut(&entry.slot_id) {
                    entries.push(entry.clone());
                }
            }
            ScheduleEvent::BookingReverted { entry_id, slot_id, .. } => {
                if let Some((_, entries)) = self.slots.get_mut(slot_id) {
                    entries.retain(|e| e.id != *entry_id);
                }
            }
            ScheduleEvent::EntryUpdated { entry } => {
                if let Some((_, entries)) = self.slots.get_mut(&entry.slot_id)
                    && let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id)
                {
                    *existing = entry.clone();
                }
            }
        }
    }

    /// Minimal record set: each slot at zero, followed by its live bookings.
    fn records(&self) -> Vec<ScheduleEvent> {
        let mut records = Vec::new();
        for (slot, entries) in self.slots.values() {
            records.push(ScheduleEvent::SlotCreated { slot: slot.clone() });
            records.extend(entries.iter().map(|entry| ScheduleEvent::BookingCommitted { entry: entry.clone() }));
        }
        records
    }
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders; fold the batch into the committed copy on success.
async fn journal_writer_loop(
    mut journal: Journal<ScheduleEvent>,
    mut committed: Committed,
    mut rx: mpsc::Receiver<JournalCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut journal, &mut committed, batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut journal, &committed, other);
                }
            }
            other => handle_non_append(&mut journal, &committed, other),
        }
    }
}

fn commit_batch(
    journal: &mut Journal<ScheduleEvent>,
    committed: &mut Committed,
    batch: Vec<(ScheduleEvent, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = journal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flushed = journal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (event, tx) in batch {
        let reply = match &result {
            Ok(()) => {
                committed.apply(&event);
                Ok(())
            }
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(journal: &mut Journal<ScheduleEvent>, committed: &Committed, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { response } => {
            let _ = response.send(journal.rewrite(&committed.records()));
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Owner of all slot state. Every slot mutation goes through here, is journaled
/// first and applied second.
pub struct SlotLedger {
    slots: DashMap<Ulid, SharedSlotState>,
    /// One slot per date. Reserved before the slot is journaled.
    by_date: DashMap<NaiveDate, Ulid>,
    entry_to_slot: DashMap<Ulid, Ulid>,
    request_entries: DashMap<Ulid, Vec<Ulid>>,
    journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl SlotLedger {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events: Vec<ScheduleEvent> = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;

        let mut committed = Committed::default();
        for event in &events {
            committed.apply(event);
        }
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, committed, journal_rx));

        let ledger = Self {
            slots: DashMap::new(),
            by_date: DashMap::new(),
            entry_to_slot: DashMap::new(),
            request_entries: DashMap::new(),
            journal_tx,
            notify,
        };

        // Sole owner of these Arcs during replay, so try_write never contends.
        for event in &events {
            match event {
                ScheduleEvent::SlotCreated { slot } => ledger.insert_slot(slot.clone()),
                other => {
                    let Some(shared) = ledger.get_slot(&other.slot_id()) else {
                        warn!("journal replay: event for unknown slot {}", other.slot_id());
                        continue;
                    };
                    let mut guard = shared.try_write().expect("replay: uncontended write");
                    match guard.apply(other) {
                        Ok(()) => ledger.index(other),
                        Err(e) => warn!("journal replay: skipping event: {e}"),
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::SLOTS_ACTIVE).set(ledger.slots.len() as f64);

        Ok(ledger)
    }

    pub(super) fn get_slot(&self, id: &Ulid) -> Option<SharedSlotState> {
        self.slots.get(id).map(|e| e.value().clone())
    }

    pub(super) fn insert_slot(&self, slot: WeekendSlot) {
        self.by_date.insert(slot.date, slot.id);
        self.slots.insert(
            slot.id,
            Arc::new(RwLock::new(SlotState { slot, entries: Vec::new() })),
        );
    }

    /// Write the event to the journal via the group-commit writer.
    pub(super) async fn journal_append(&self, event: &ScheduleEvent) -> Result<(), ScheduleError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| ScheduleError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| ScheduleError::Journal("journal writer dropped response".into()))?
            .map_err(|e| ScheduleError::Journal(e.to_string()))
    }

    /// Journal + apply + notify. The event is validated against a copy of the
    /// locked slot first, so a rejected event never reaches the journal.
    pub(super) async fn persist_and_apply(&self, state: &mut SlotState, event: &ScheduleEvent) -> Result<(), ScheduleError> {
        let mut next = state.clone();
        next.apply(event)?;
        self.journal_append(event).await?;
        *state = next;
        self.index(event);
        self.notify.send(event);
        Ok(())
    }

    fn index(&self, event: &ScheduleEvent) {
        match event {
            ScheduleEvent::BookingCommitted { entry } => {
                self.entry_to_slot.insert(entry.id, entry.slot_id);
                self.request_entries.entry(entry.request_id).or_default().push(entry.id);
            }
            ScheduleEvent::BookingReverted { entry_id, request_id, .. } => {
                self.entry_to_slot.remove(entry_id);
                if let Some(mut ids) = self.request_entries.get_mut(request_id) {
                    ids.retain(|id| id != entry_id);
                }
            }
            ScheduleEvent::SlotCreated { .. } | ScheduleEvent::EntryUpdated { .. } => {}
        }
    }
}
