use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ScheduleError;

/// Capacity a freshly generated slot starts with.
pub const DEFAULT_TOTAL_HOURS: u32 = 8;
pub const DEFAULT_MAX_PROJECTS: u32 = 5;

/// Which weekend day a slot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn of(date: NaiveDate) -> Option<Self> {
        use chrono::Datelike;
        match date.weekday() {
            Weekday::Sat => Some(DayOfWeek::Saturday),
            Weekday::Sun => Some(DayOfWeek::Sunday),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Booked,
    Full,
}

impl SlotStatus {
    /// Status implied by a slot's counters.
    pub fn derive(booked_hours: u32, total_hours: u32, booked_projects: u32, max_projects: u32) -> Self {
        if booked_hours >= total_hours || booked_projects >= max_projects {
            SlotStatus::Full
        } else if booked_hours == 0 && booked_projects == 0 {
            SlotStatus::Available
        } else {
            SlotStatus::Booked
        }
    }
}

/// One weekend day of build capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekendSlot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub day_of_week: DayOfWeek,
    pub total_hours: u32,
    pub booked_hours: u32,
    pub max_projects: u32,
    pub booked_projects: u32,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
}

impl WeekendSlot {
    pub fn new(id: Ulid, date: NaiveDate, day_of_week: DayOfWeek, capacity: SlotCapacity, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            date,
            day_of_week,
            total_hours: capacity.total_hours,
            booked_hours: 0,
            max_projects: capacity.max_projects,
            booked_projects: 0,
            status: SlotStatus::Available,
            created_at,
        }
    }

    pub fn remaining_hours(&self) -> u32 {
        self.total_hours.saturating_sub(self.booked_hours)
    }

    /// Apply a signed change to the booked counters and recompute status.
    ///
    /// Fails without touching the slot if either counter would leave
    /// `0..=total` (hours) or `0..=max` (projects).
    pub fn apply_booking(&mut self, hours: i64, project_delta: i64) -> Result<SlotStatus, ScheduleError> {
        let booked_hours = i64::from(self.booked_hours) + hours;
        let booked_projects = i64::from(self.booked_projects) + project_delta;
        if booked_hours < 0
            || booked_hours > i64::from(self.total_hours)
            || booked_projects < 0
            || booked_projects > i64::from(self.max_projects)
        {
            return Err(ScheduleError::CapacityExceeded { slot_id: self.id });
        }
        self.booked_hours = booked_hours as u32;
        self.booked_projects = booked_projects as u32;
        self.status = SlotStatus::derive(
            self.booked_hours,
            self.total_hours,
            self.booked_projects,
            self.max_projects,
        );
        Ok(self.status)
    }
}

/// Fixed capacity assigned to new slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCapacity {
    pub total_hours: u32,
    pub max_projects: u32,
}

impl Default for SlotCapacity {
    fn default() -> Self {
        Self {
            total_hours: DEFAULT_TOTAL_HOURS,
            max_projects: DEFAULT_MAX_PROJECTS,
        }
    }
}

// ── Build requests (owned by the request subsystem) ─────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Website,
    MobileApp,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Basic,
    Standard,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingType {
    Vercel,
    Replit,
    Heroku,
    Whitelabel,
}

/// Lifecycle of a build request. Schedule entries carry the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Queued,
    Scheduled,
    Building,
    Review,
    Deploying,
    Completed,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub id: Ulid,
    pub user_id: Ulid,
    pub title: String,
    pub request_type: RequestType,
    pub complexity: Complexity,
    pub hosting_type: HostingType,
    pub status: RequestStatus,
    pub estimated_cost: f64,
    pub is_free: bool,
    pub scheduled_weekend: Option<NaiveDate>,
    pub builder_id: Option<Ulid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuildRequest {
    /// A pending request with pricing filled in from its type, complexity and hosting.
    pub fn new(
        user_id: Ulid,
        title: impl Into<String>,
        request_type: RequestType,
        complexity: Complexity,
        hosting_type: HostingType,
    ) -> Self {
        let now = Utc::now();
        let mut req = Self {
            id: Ulid::new(),
            user_id,
            title: title.into(),
            request_type,
            complexity,
            hosting_type,
            status: RequestStatus::Pending,
            estimated_cost: estimate_cost(request_type, complexity, hosting_type),
            is_free: false,
            scheduled_weekend: None,
            builder_id: None,
            created_at: now,
            updated_at: now,
        };
        req.is_free = !req.is_paid();
        req
    }

    /// Websites on free hosting are built at no charge; everything else is paid.
    pub fn is_paid(&self) -> bool {
        !(self.request_type == RequestType::Website && self.hosting_type != HostingType::Whitelabel)
    }
}

pub fn estimate_cost(request_type: RequestType, complexity: Complexity, hosting: HostingType) -> f64 {
    if request_type == RequestType::Website && hosting != HostingType::Whitelabel {
        return 0.0;
    }
    let mut cost = match complexity {
        Complexity::Basic => 2999.0,
        Complexity::Standard => 5999.0,
        Complexity::Advanced => 11999.0,
    };
    if matches!(request_type, RequestType::MobileApp | RequestType::Both) {
        cost *= 1.5;
    }
    if hosting == HostingType::Whitelabel {
        cost += 1999.0;
    }
    cost
}

// ── Schedule entries ────────────────────────────────────────────

/// A request committed to a slot for a number of capacity hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Ulid,
    pub request_id: Ulid,
    pub slot_id: Ulid,
    pub builder_id: Option<Ulid>,
    pub hours: u32,
    pub status: RequestStatus,
    pub notes: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Entry starting at midnight of the slot's date. Hours are capacity units,
    /// so `end_time` is not clipped to the day. Fails with `InvalidHours` when
    /// the end falls outside the representable calendar.
    pub fn for_slot(request_id: Ulid, slot: &WeekendSlot, hours: u32, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let start_time = slot.date.and_time(chrono::NaiveTime::MIN);
        let end_time = chrono::TimeDelta::try_hours(i64::from(hours))
            .and_then(|span| start_time.checked_add_signed(span))
            .ok_or(ScheduleError::InvalidHours(hours))?;
        Ok(Self {
            id: Ulid::new(),
            request_id,
            slot_id: slot.id,
            builder_id: None,
            hours,
            status: RequestStatus::Scheduled,
            notes: String::new(),
            start_time,
            end_time,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status != RequestStatus::Cancelled
    }
}

/// Admin-side changes to an entry. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub status: Option<RequestStatus>,
    pub builder_id: Option<Ulid>,
    pub notes: Option<String>,
}

/// Slot, its entries and the requests behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub slot: WeekendSlot,
    pub entries: Vec<ScheduleEntry>,
    pub requests: Vec<BuildRequest>,
}

/// Ledger events, flat with no nesting. This is the journal record format and the
/// payload handed to notification subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    SlotCreated {
        slot: WeekendSlot,
    },
    BookingCommitted {
        entry: ScheduleEntry,
    },
    BookingReverted {
        entry_id: Ulid,
        slot_id: Ulid,
        request_id: Ulid,
    },
    EntryUpdated {
        entry: ScheduleEntry,
    },
}

impl ScheduleEvent {
    pub fn slot_id(&self) -> Ulid {
        match self {
            ScheduleEvent::SlotCreated { slot } => slot.id,
            ScheduleEvent::BookingCommitted { entry } | ScheduleEvent::EntryUpdated { entry } => entry.slot_id,
            ScheduleEvent::BookingReverted { slot_id, .. } => *slot_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saturday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 24).unwrap()
    }

    fn fresh_slot() -> WeekendSlot {
        WeekendSlot::new(Ulid::new(), saturday(), DayOfWeek::Saturday, SlotCapacity::default(), Utc::now())
    }

    #[test]
    fn day_of_week_only_for_weekends() {
        assert_eq!(DayOfWeek::of(saturday()), Some(DayOfWeek::Saturday));
        assert_eq!(DayOfWeek::of(saturday().succ_opt().unwrap()), Some(DayOfWeek::Sunday));
        assert_eq!(DayOfWeek::of(NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()), None);
    }

    #[test]
    fn status_derivation() {
        assert_eq!(SlotStatus::derive(0, 8, 0, 5), SlotStatus::Available);
        assert_eq!(SlotStatus::derive(3, 8, 1, 5), SlotStatus::Booked);
        assert_eq!(SlotStatus::derive(8, 8, 2, 5), SlotStatus::Full);
        assert_eq!(SlotStatus::derive(5, 8, 5, 5), SlotStatus::Full);
    }

    #[test]
    fn apply_booking_updates_counters_and_status() {
        let mut slot = fresh_slot();
        assert_eq!(slot.apply_booking(3, 1).unwrap(), SlotStatus::Booked);
        assert_eq!((slot.booked_hours, slot.booked_projects), (3, 1));
        assert_eq!(slot.apply_booking(5, 1).unwrap(), SlotStatus::Full);
        assert_eq!(slot.remaining_hours(), 0);
    }

    #[test]
    fn apply_booking_rejects_overshoot_without_mutation() {
        let mut slot = fresh_slot();
        slot.apply_booking(6, 1).unwrap();
        let before = slot.clone();
        let err = slot.apply_booking(3, 1).unwrap_err();
        assert!(matches!(err, ScheduleError::CapacityExceeded { .. }));
        assert_eq!(slot, before);
    }

    #[test]
    fn apply_booking_reversal_returns_to_available() {
        let mut slot = fresh_slot();
        slot.apply_booking(4, 1).unwrap();
        assert_eq!(slot.apply_booking(-4, -1).unwrap(), SlotStatus::Available);
        assert!(slot.apply_booking(-1, 0).is_err()); // below zero
    }

    #[test]
    fn project_ceiling_fills_slot() {
        let mut slot = fresh_slot();
        for _ in 0..4 {
            assert_eq!(slot.apply_booking(1, 1).unwrap(), SlotStatus::Booked);
        }
        assert_eq!(slot.apply_booking(1, 1).unwrap(), SlotStatus::Full);
        assert_eq!(slot.booked_hours, 5);
    }

    #[test]
    fn entry_times_run_from_midnight() {
        let slot = fresh_slot();
        let entry = ScheduleEntry::for_slot(Ulid::new(), &slot, 3, Utc::now()).unwrap();
        assert_eq!(entry.start_time, saturday().and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(entry.end_time, saturday().and_hms_opt(3, 0, 0).unwrap());
        assert_eq!(entry.status, RequestStatus::Scheduled);

        // Not clipped to the day.
        let long = ScheduleEntry::for_slot(Ulid::new(), &slot, 30, Utc::now()).unwrap();
        assert_eq!(long.end_time, saturday().succ_opt().unwrap().and_hms_opt(6, 0, 0).unwrap());
    }

    #[test]
    fn entry_past_the_calendar_is_rejected() {
        assert_eq!(
            ScheduleEntry::for_slot(Ulid::new(), &fresh_slot(), u32::MAX, Utc::now()),
            Err(ScheduleError::InvalidHours(u32::MAX))
        );
        let mut last_day = fresh_slot();
        last_day.date = NaiveDate::MAX;
        assert!(ScheduleEntry::for_slot(Ulid::new(), &last_day, 24, Utc::now()).is_err());

        let century = ScheduleEntry::for_slot(Ulid::new(), &fresh_slot(), 1_000_000, Utc::now()).unwrap();
        assert!(century.end_time > century.start_time);
    }

    #[test]
    fn pricing() {
        assert_eq!(estimate_cost(RequestType::Website, Complexity::Advanced, HostingType::Vercel), 0.0);
        assert_eq!(estimate_cost(RequestType::Website, Complexity::Basic, HostingType::Whitelabel), 2999.0 + 1999.0);
        assert_eq!(estimate_cost(RequestType::MobileApp, Complexity::Standard, HostingType::Replit), 5999.0 * 1.5);
        assert_eq!(
            estimate_cost(RequestType::Both, Complexity::Advanced, HostingType::Whitelabel),
            11999.0 * 1.5 + 1999.0
        );
    }

    #[test]
    fn new_request_sets_free_flag() {
        let free = BuildRequest::new(Ulid::new(), "site", RequestType::Website, Complexity::Basic, HostingType::Vercel);
        assert!(free.is_free);
        assert_eq!(free.status, RequestStatus::Pending);
        let paid = BuildRequest::new(Ulid::new(), "app", RequestType::MobileApp, Complexity::Basic, HostingType::Vercel);
        assert!(!paid.is_free);
        assert!(paid.estimated_cost > 0.0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = ScheduleEvent::SlotCreated { slot: fresh_slot() };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: ScheduleEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
