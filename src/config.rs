use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::*;
use crate::log::RetryPolicy;

/// Process configuration, read from `HUDDLE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub chunk_capacity: usize,
    pub retry: RetryPolicy,
    pub default_timezone: String,
    pub max_active_people: usize,
    pub reminder_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            retry: RetryPolicy::default(),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            max_active_people: MAX_ACTIVE_PEOPLE,
            reminder_poll: Duration::from_secs(60),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or unparseable values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_timezone = lookup("HUDDLE_DEFAULT_TIMEZONE")
            .filter(|tz| tz.trim().parse::<chrono_tz::Tz>().is_ok())
            .unwrap_or(defaults.default_timezone);
        Self {
            data_dir: lookup("HUDDLE_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "HUDDLE_METRICS_PORT"),
            chunk_capacity: parsed(&lookup, "HUDDLE_CHUNK_CAPACITY")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.chunk_capacity),
            retry: RetryPolicy {
                max_attempts: parsed(&lookup, "HUDDLE_APPEND_MAX_ATTEMPTS")
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(defaults.retry.max_attempts),
                backoff: parsed(&lookup, "HUDDLE_APPEND_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            default_timezone: default_timezone.trim().to_string(),
            max_active_people: parsed(&lookup, "HUDDLE_MAX_ACTIVE_PEOPLE").unwrap_or(defaults.max_active_people),
            reminder_poll: parsed(&lookup, "HUDDLE_REMINDER_POLL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reminder_poll),
        }
    }
}
