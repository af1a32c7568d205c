use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only instant type used for interval math.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

pub const SCHEMA_VERSION: u32 = 1;

/// One schedule group's whole shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    pub schema_version: u32,
    pub group: GroupMeta,
    pub people: Vec<Person>,
    pub members: Vec<Member>,
    pub appointments: Vec<Appointment>,
    pub availability_rules: Vec<AvailabilityRule>,
}

impl ScheduleState {
    pub fn empty(group_id: &str, timezone: &str, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            group: GroupMeta {
                group_id: group_id.to_string(),
                name: None,
                timezone: timezone.to_string(),
                created_at: now,
                updated_at: now,
            },
            people: Vec::new(),
            members: Vec::new(),
            appointments: Vec::new(),
            availability_rules: Vec::new(),
        }
    }

    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.person_id == id)
    }

    pub fn active_people(&self) -> impl Iterator<Item = &Person> {
        self.people.iter().filter(|p| p.status == PersonStatus::Active)
    }

    pub fn appointment_by_code(&self, code: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMeta {
    pub group_id: String,
    pub name: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    Active,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: String,
    pub name: String,
    pub cell_e164: Option<String>,
    pub cell_display: Option<String>,
    pub status: PersonStatus,
    pub timezone: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Group membership status, ordered by priority when collapsing duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Removed,
    Invited,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub email: String,
    pub status: MemberStatus,
    pub role: MemberRole,
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub code: String,
    pub title: String,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub duration_mins: Option<u32>,
    pub is_all_day: bool,
    /// Derived RFC 3339 instant in the appointment's local offset.
    pub start: Option<String>,
    /// Derived RFC 3339 instant in the appointment's local offset.
    pub end: Option<String>,
    pub timezone: String,
    pub people: Vec<String>,
    pub location_raw: String,
    pub location: String,
    pub location_map_query: String,
    pub notes: String,
    pub scan_image_key: Option<String>,
    pub scan_status: Option<ScanStatus>,
    pub scan_captured_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn timing(&self) -> Timing<'_> {
        Timing {
            date: self.date.as_deref(),
            start_time: self.start_time.as_deref(),
            duration_mins: self.duration_mins,
            timezone: &self.timezone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Available,
    Unavailable,
}

impl RuleKind {
    pub fn opposite(self) -> Self {
        match self {
            RuleKind::Available => RuleKind::Unavailable,
            RuleKind::Unavailable => RuleKind::Available,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Available => "available",
            RuleKind::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRule {
    pub code: String,
    pub person_id: String,
    pub kind: RuleKind,
    pub date: String,
    pub start_time: Option<String>,
    pub duration_mins: Option<u32>,
    pub timezone: String,
    pub desc: String,
}

impl AvailabilityRule {
    pub fn timing(&self) -> Timing<'_> {
        Timing {
            date: Some(&self.date),
            start_time: self.start_time.as_deref(),
            duration_mins: self.duration_mins,
            timezone: &self.timezone,
        }
    }
}

/// The date/time fields of anything that occupies time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing<'a> {
    pub date: Option<&'a str>,
    pub start_time: Option<&'a str>,
    pub duration_mins: Option<u32>,
    pub timezone: &'a str,
}
