/// Maximum active people per group.
pub const MAX_ACTIVE_PEOPLE: usize = 10;

pub const MAX_PERSON_NAME_LEN: usize = 40;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_TITLE_LEN: usize = 160;
pub const MAX_LOCATION_LEN: usize = 200;
pub const MAX_RULE_DESC_LEN: usize = 200;

/// Default duration for timed entries without one.
pub const DEFAULT_DURATION_MINS: u32 = 60;
pub const MAX_DURATION_MINS: u32 = 24 * 60;
/// Zero-length points still occupy this much time.
pub const MIN_SPAN_MS: i64 = 60_000;

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Maximum actions accepted in one batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Events per chunk before rollover.
pub const DEFAULT_CHUNK_CAPACITY: usize = 200;
pub const DEFAULT_APPEND_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_APPEND_BACKOFF_MS: u64 = 10;
/// Upper bound on a single `recent` page.
pub const MAX_PAGE_SIZE: usize = 500;

pub const MAX_GROUP_ID_LEN: usize = 128;
