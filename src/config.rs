//! Environment-driven configuration. A `.env` file in the working directory is
//! loaded first when present.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::model::{SlotCapacity, DEFAULT_MAX_PROJECTS, DEFAULT_TOTAL_HOURS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Whether one build request may hold several non-cancelled schedule entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPolicy {
    /// Any number of active entries per request.
    #[default]
    Multiple,
    /// At most one active entry per request.
    Single,
}

impl FromStr for EntryPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multiple" => Ok(EntryPolicy::Multiple),
            "single" => Ok(EntryPolicy::Single),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the ledger journal.
    pub data_dir: PathBuf,
    /// Weekends generated ahead of today.
    pub horizon_weeks: u32,
    /// How often the generator re-runs after startup.
    pub regenerate_interval: Duration,
    /// Slots returned by the upcoming-slots view.
    pub upcoming_limit: usize,
    /// Deadline for each collaborator call and slot lock wait.
    pub store_timeout: Duration,
    pub entry_policy: EntryPolicy,
    pub slot_capacity: SlotCapacity,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            horizon_weeks: 8,
            regenerate_interval: Duration::from_secs(24 * 60 * 60),
            upcoming_limit: 20,
            store_timeout: Duration::from_secs(5),
            entry_policy: EntryPolicy::Multiple,
            slot_capacity: SlotCapacity {
                total_hours: DEFAULT_TOTAL_HOURS,
                max_projects: DEFAULT_MAX_PROJECTS,
            },
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let entry_policy = match lookup("SLOTS_ENTRY_POLICY") {
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                var: "SLOTS_ENTRY_POLICY",
                expected: "\"single\" or \"multiple\"",
                value,
            })?,
            None => defaults.entry_policy,
        };

        let slot_capacity = SlotCapacity {
            total_hours: positive(&lookup, "SLOTS_TOTAL_HOURS")?.unwrap_or(defaults.slot_capacity.total_hours),
            max_projects: positive(&lookup, "SLOTS_MAX_PROJECTS")?.unwrap_or(defaults.slot_capacity.max_projects),
        };

        Ok(Self {
            data_dir: lookup("SLOTS_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            horizon_weeks: parsed(&lookup, "SLOTS_HORIZON_WEEKS")?.unwrap_or(defaults.horizon_weeks),
            regenerate_interval: positive::<u64>(&lookup, "SLOTS_REGENERATE_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.regenerate_interval),
            upcoming_limit: parsed(&lookup, "SLOTS_UPCOMING_LIMIT")?.unwrap_or(defaults.upcoming_limit),
            store_timeout: positive::<u64>(&lookup, "SLOTS_STORE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            entry_policy,
            slot_capacity,
            compact_threshold: positive(&lookup, "SLOTS_COMPACT_THRESHOLD")?.unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "SLOTS_METRICS_PORT")?,
        })
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                var,
                expected: "a non-negative integer",
                value,
            })
        })
        .transpose()
}

fn positive<T: FromStr + PartialOrd + Default>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match parsed::<T>(lookup, var)? {
        Some(v) if v <= T::default() => Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: lookup(var).unwrap_or_default(),
        }),
        other => Ok(other),
    }
}
