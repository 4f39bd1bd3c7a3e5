use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::calendar;
use crate::error::ScheduleError;
use crate::ledger::SlotLedger;
use crate::model::*;
use crate::observability;
use crate::store::{with_deadline, RequestStore};

/// Read-only composition of a slot, its entries and their requests.
pub struct ScheduleViewAssembler {
    ledger: Arc<SlotLedger>,
    requests: Arc<dyn RequestStore>,
    upcoming_limit: usize,
    store_timeout: Duration,
}

impl ScheduleViewAssembler {
    pub fn new(ledger: Arc<SlotLedger>, requests: Arc<dyn RequestStore>, upcoming_limit: usize, store_timeout: Duration) -> Self {
        Self {
            ledger,
            requests,
            upcoming_limit,
            store_timeout,
        }
    }

    /// The schedule for the slot on `date`. Requests that cannot be loaded are
    /// left out of the view rather than failing it.
    pub async fn get_schedule_for_weekend(&self, date: NaiveDate) -> Result<ScheduleView, ScheduleError> {
        let slot = self
            .ledger
            .find_by_date(date)
            .await
            .ok_or(ScheduleError::SlotNotFoundForDate(date))?;
        let entries = self.ledger.entries_for_slot(slot.id).await;

        let lookups = entries.iter().map(|entry| {
            let request_id = entry.request_id;
            async move {
                (
                    request_id,
                    with_deadline("find_request", self.store_timeout, self.requests.find_by_id(request_id)).await,
                )
            }
        });

        let mut requests = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;
        for (request_id, result) in join_all(lookups).await {
            match result {
                Ok(Some(request)) => requests.push(request),
                Ok(None) => {
                    skipped += 1;
                    debug!("schedule view for {date}: request {request_id} no longer exists");
                }
                Err(e) => {
                    skipped += 1;
                    warn!("schedule view for {date}: skipping request {request_id}: {e}");
                }
            }
        }

        let partial = if skipped > 0 { "true" } else { "false" };
        metrics::counter!(observability::VIEWS_TOTAL, "partial" => partial).increment(1);
        Ok(ScheduleView { slot, entries, requests })
    }

    /// Same as `get_schedule_for_weekend` for the day containing `at`.
    pub async fn get_schedule_containing(&self, at: NaiveDateTime) -> Result<ScheduleView, ScheduleError> {
        self.get_schedule_for_weekend(calendar::normalize_day(at)).await
    }

    pub async fn get_schedule_for_next_weekend(&self) -> Result<ScheduleView, ScheduleError> {
        self.get_schedule_for_weekend(calendar::next_saturday(calendar::today())).await
    }

    pub async fn get_upcoming_slots(&self) -> Vec<WeekendSlot> {
        self.get_upcoming_slots_from(calendar::today()).await
    }

    pub async fn get_upcoming_slots_from(&self, today: NaiveDate) -> Vec<WeekendSlot> {
        self.ledger.list_upcoming(today, self.upcoming_limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use crate::store::InMemoryRequestStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("weekend_slots_test_view_{}", Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn book(ledger: &SlotLedger, slot_id: Ulid, request_id: Ulid, hours: u32) -> ScheduleEntry {
        let mut txn = ledger.lock_slot(slot_id, Duration::from_secs(1)).await.unwrap();
        let entry = ScheduleEntry::for_slot(request_id, txn.slot(), hours, Utc::now()).unwrap();
        ledger.commit_booking(&mut txn, entry.clone()).await.unwrap();
        entry
    }

    fn request() -> BuildRequest {
        BuildRequest::new(Ulid::new(), "booking app", RequestType::MobileApp, Complexity::Basic, HostingType::Heroku)
    }

    #[tokio::test]
    async fn view_joins_slot_entries_and_requests() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("join.journal"), Arc::new(NotifyHub::new())).unwrap());
        let requests = Arc::new(InMemoryRequestStore::new());
        let view = ScheduleViewAssembler::new(ledger.clone(), requests.clone(), 20, Duration::from_secs(1));

        let sat = date(2026, 10, 24);
        let slot = ledger.create_slot(sat, SlotCapacity::default(), Utc::now()).await.unwrap();
        let (a, b) = (request(), request());
        requests.insert(a.clone());
        requests.insert(b.clone());
        let ea = book(&ledger, slot.id, a.id, 3).await;
        let eb = book(&ledger, slot.id, b.id, 2).await;

        let schedule = view.get_schedule_for_weekend(sat).await.unwrap();
        assert_eq!(schedule.slot.booked_hours, 5);
        assert_eq!(schedule.entries, vec![ea, eb]);
        let ids: Vec<Ulid> = schedule.requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);

        // Any time of day resolves to the same slot.
        let afternoon = sat.and_hms_opt(15, 30, 0).unwrap();
        assert_eq!(view.get_schedule_containing(afternoon).await.unwrap(), schedule);
    }

    #[tokio::test]
    async fn missing_slot_is_not_found() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("missing.journal"), Arc::new(NotifyHub::new())).unwrap());
        let view = ScheduleViewAssembler::new(ledger, Arc::new(InMemoryRequestStore::new()), 20, Duration::from_secs(1));

        let sat = date(2026, 10, 24);
        let err = view.get_schedule_for_weekend(sat).await.unwrap_err();
        assert_eq!(err, ScheduleError::SlotNotFoundForDate(sat));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn absent_requests_are_skipped() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("absent.journal"), Arc::new(NotifyHub::new())).unwrap());
        let requests = Arc::new(InMemoryRequestStore::new());
        let view = ScheduleViewAssembler::new(ledger.clone(), requests.clone(), 20, Duration::from_secs(1));

        let sun = date(2026, 10, 25);
        let slot = ledger.create_slot(sun, SlotCapacity::default(), Utc::now()).await.unwrap();
        let known = request();
        requests.insert(known.clone());
        book(&ledger, slot.id, known.id, 2).await;
        book(&ledger, slot.id, Ulid::new(), 2).await;

        let schedule = view.get_schedule_for_weekend(sun).await.unwrap();
        assert_eq!(schedule.entries.len(), 2);
        assert_eq!(schedule.requests, vec![known]);
    }

    /// Store where one request hangs and the rest fail outright.
    struct Flaky {
        hanging: Ulid,
    }

    #[async_trait]
    impl RequestStore for Flaky {
        async fn find_by_id(&self, id: Ulid) -> Result<Option<BuildRequest>, ScheduleError> {
            if id == self.hanging {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Err(ScheduleError::StoreUnavailable("connection reset".into()))
        }

        async fn update(&self, _request: &BuildRequest) -> Result<(), ScheduleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_lookups_yield_partial_view() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("flaky.journal"), Arc::new(NotifyHub::new())).unwrap());
        let hanging = Ulid::new();
        let view = ScheduleViewAssembler::new(ledger.clone(), Arc::new(Flaky { hanging }), 20, Duration::from_millis(20));

        let sat = date(2026, 10, 24);
        let slot = ledger.create_slot(sat, SlotCapacity::default(), Utc::now()).await.unwrap();
        book(&ledger, slot.id, hanging, 1).await;
        book(&ledger, slot.id, Ulid::new(), 1).await;

        let schedule = view.get_schedule_for_weekend(sat).await.unwrap();
        assert_eq!(schedule.entries.len(), 2);
        assert!(schedule.requests.is_empty());
    }

    #[tokio::test]
    async fn upcoming_slots_respect_limit() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("upcoming.journal"), Arc::new(NotifyHub::new())).unwrap());
        let view = ScheduleViewAssembler::new(ledger.clone(), Arc::new(InMemoryRequestStore::new()), 3, Duration::from_secs(1));

        for d in [date(2026, 10, 24), date(2026, 10, 25), date(2026, 10, 31), date(2026, 11, 1)] {
            ledger.create_slot(d, SlotCapacity::default(), Utc::now()).await.unwrap();
        }
        let dates: Vec<NaiveDate> = view.get_upcoming_slots_from(date(2026, 10, 19)).await.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(2026, 10, 24), date(2026, 10, 25), date(2026, 10, 31)]);
    }

    #[tokio::test]
    async fn next_weekend_resolves_from_today() {
        let ledger = Arc::new(SlotLedger::open(test_journal_path("next.journal"), Arc::new(NotifyHub::new())).unwrap());
        let view = ScheduleViewAssembler::new(ledger.clone(), Arc::new(InMemoryRequestStore::new()), 20, Duration::from_secs(1));

        let next = calendar::next_saturday(calendar::today());
        assert_eq!(view.get_schedule_for_next_weekend().await.unwrap_err(), ScheduleError::SlotNotFoundForDate(next));

        ledger.create_slot(next, SlotCapacity::default(), Utc::now()).await.unwrap();
        assert_eq!(view.get_schedule_for_next_weekend().await.unwrap().slot.date, next);
    }
}
