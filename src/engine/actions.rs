use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::{DEFAULT_TIMEZONE, MAX_ACTIVE_PEOPLE};
use crate::model::{RuleKind, ScheduleState};

/// One structured mutation or query, already shape-validated by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    SetIdentity {
        name: String,
    },
    AddPerson {
        name: String,
        phone: String,
        #[serde(default)]
        timezone: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    UpdatePerson {
        person: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        phone: Option<String>,
        #[serde(default)]
        timezone: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    RemovePerson {
        person: String,
    },
    ReactivatePerson {
        person: String,
    },
    AddAppointment {
        desc: String,
        date: String,
        #[serde(default, rename = "startTime")]
        start_time: Option<String>,
        #[serde(default, rename = "durationMins")]
        duration_mins: Option<u32>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        people: Vec<String>,
    },
    DeleteAppointment {
        code: String,
    },
    UpdateAppointmentDesc {
        code: String,
        desc: String,
    },
    SetAppointmentDate {
        code: String,
        date: String,
    },
    /// `None` makes the appointment all-day.
    SetAppointmentStartTime {
        code: String,
        #[serde(default, rename = "startTime")]
        start_time: Option<String>,
    },
    SetAppointmentDuration {
        code: String,
        #[serde(default, rename = "durationMins")]
        duration_mins: Option<u32>,
    },
    RescheduleAppointment {
        code: String,
        date: String,
        #[serde(default, rename = "startTime")]
        start_time: Option<String>,
        #[serde(default, rename = "durationMins")]
        duration_mins: Option<u32>,
    },
    SetAppointmentLocation {
        code: String,
        location: String,
    },
    SetAppointmentNotes {
        code: String,
        notes: String,
    },
    ReplaceAppointmentPeople {
        code: String,
        people: Vec<String>,
    },
    AddAppointmentPeople {
        code: String,
        people: Vec<String>,
    },
    RemoveAppointmentPeople {
        code: String,
        people: Vec<String>,
    },
    AddRule {
        person: String,
        kind: RuleKind,
        date: String,
        #[serde(default, rename = "startTime")]
        start_time: Option<String>,
        #[serde(default, rename = "durationMins")]
        duration_mins: Option<u32>,
        #[serde(default)]
        desc: Option<String>,
    },
    DeleteRule {
        code: String,
    },
    List {
        #[serde(default)]
        what: ListTarget,
    },
    Show {
        code: String,
    },
    Help,
    Reset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListTarget {
    People,
    Appointments,
    Rules,
    #[default]
    All,
}

impl Action {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Action::SetIdentity { .. } => "set_identity",
            Action::AddPerson { .. } => "add_person",
            Action::UpdatePerson { .. } => "update_person",
            Action::RemovePerson { .. } => "remove_person",
            Action::ReactivatePerson { .. } => "reactivate_person",
            Action::AddAppointment { .. } => "add_appointment",
            Action::DeleteAppointment { .. } => "delete_appointment",
            Action::UpdateAppointmentDesc { .. } => "update_appointment_desc",
            Action::SetAppointmentDate { .. } => "set_appointment_date",
            Action::SetAppointmentStartTime { .. } => "set_appointment_start_time",
            Action::SetAppointmentDuration { .. } => "set_appointment_duration",
            Action::RescheduleAppointment { .. } => "reschedule_appointment",
            Action::SetAppointmentLocation { .. } => "set_appointment_location",
            Action::SetAppointmentNotes { .. } => "set_appointment_notes",
            Action::ReplaceAppointmentPeople { .. } => "replace_appointment_people",
            Action::AddAppointmentPeople { .. } => "add_appointment_people",
            Action::RemoveAppointmentPeople { .. } => "remove_appointment_people",
            Action::AddRule { .. } => "add_rule",
            Action::DeleteRule { .. } => "delete_rule",
            Action::List { .. } => "list",
            Action::Show { .. } => "show",
            Action::Help => "help",
            Action::Reset => "reset",
        }
    }
}

/// Who is acting, where, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub active_person_id: Option<String>,
    pub timezone: String,
    pub now: DateTime<Utc>,
    pub max_active_people: usize,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            active_person_id: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            now: Utc::now(),
            max_active_people: MAX_ACTIVE_PEOPLE,
        }
    }
}

impl ActionContext {
    pub fn new(timezone: impl Into<String>) -> Self {
        Self {
            timezone: timezone.into(),
            ..Self::default()
        }
    }

    pub fn acting_as(mut self, person_id: impl Into<String>) -> Self {
        self.active_person_id = Some(person_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub next_state: ScheduleState,
    pub effects: Vec<String>,
    pub applied_all: bool,
    pub next_active_person_id: Option<String>,
}
