use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

/// Everything the scheduling core can fail with. Every variant is scoped to a
/// single call; none of them is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("slot not found: {0}")]
    SlotNotFound(Ulid),
    #[error("no slot found for {0}")]
    SlotNotFoundForDate(NaiveDate),
    #[error("request not found: {0}")]
    RequestNotFound(Ulid),
    #[error("schedule entry not found: {0}")]
    EntryNotFound(Ulid),
    #[error("user not found: {0}")]
    UserNotFound(Ulid),

    #[error("slot {0} is full")]
    SlotFull(Ulid),
    #[error("slot {slot_id} has {remaining} hours left, {requested} requested")]
    InsufficientCapacity {
        slot_id: Ulid,
        requested: u32,
        remaining: u32,
    },
    #[error("booking would exceed capacity of slot {slot_id}")]
    CapacityExceeded { slot_id: Ulid },
    #[error("slot already exists for {0}")]
    SlotAlreadyExists(NaiveDate),
    #[error("{0} is not a weekend day")]
    NotAWeekend(NaiveDate),
    #[error("request {0} already has an active schedule entry")]
    RequestAlreadyScheduled(Ulid),
    #[error("hours must be positive, got {0}")]
    InvalidHours(u32),

    #[error("slot {0} is locked by a concurrent booking; retry the booking")]
    ConcurrencyConflict(Ulid),
    #[error("request {0} is being booked concurrently; retry the booking")]
    RequestBusy(Ulid),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store call timed out: {0}")]
    StoreTimeout(&'static str),
    #[error("journal error: {0}")]
    Journal(String),
    #[error("booking task failed: {0}")]
    TaskFailed(String),
}

impl ScheduleError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScheduleError::SlotNotFound(_)
                | ScheduleError::SlotNotFoundForDate(_)
                | ScheduleError::RequestNotFound(_)
                | ScheduleError::EntryNotFound(_)
                | ScheduleError::UserNotFound(_)
        )
    }

    /// Booking rejected because the slot cannot take it.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            ScheduleError::SlotFull(_)
                | ScheduleError::InsufficientCapacity { .. }
                | ScheduleError::CapacityExceeded { .. }
        )
    }

    /// The whole operation may succeed if the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::ConcurrencyConflict(_)
                | ScheduleError::RequestBusy(_)
                | ScheduleError::StoreUnavailable(_)
                | ScheduleError::StoreTimeout(_)
        )
    }
}
