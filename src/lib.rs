//! Weekend build-slot scheduling: a rolling calendar of weekend capacity, an
//! over-booking-safe booking engine and read-only schedule views, backed by a
//! checksummed journal.

pub mod booking;
pub mod calendar;
pub mod config;
pub mod error;
pub mod generator;
pub mod journal;
pub mod ledger;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod view;

pub use booking::BookingEngine;
pub use config::{Config, EntryPolicy};
pub use error::ScheduleError;
pub use generator::SlotGenerator;
pub use ledger::SlotLedger;
pub use view::ScheduleViewAssembler;
