use std::time::Instant;

use crate::model::*;
use crate::observability::{ACTIONS_TOTAL, EXECUTE_DURATION_SECONDS};

use super::actions::{Action, ActionContext, ExecutionResult};
use super::availability::{classify_appointment, AvailabilityStatus};
use super::normalize::canonicalize;

/// Why a single action was not applied. Rendered verbatim as its effect line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected(pub String);

impl From<String> for Rejected {
    fn from(line: String) -> Self {
        Rejected(line)
    }
}

pub(super) type Outcome = Result<(), Rejected>;

/// In-progress copy of the state a batch mutates.
pub(super) struct Draft<'c> {
    pub state: ScheduleState,
    pub effects: Vec<String>,
    pub applied_all: bool,
    pub active: Option<String>,
    pub ctx: &'c ActionContext,
}

/// Apply `actions` in order against a copy of `state`.
///
/// A rejected action adds its reason to the effect lines, clears
/// `applied_all`, and the batch carries on with the next action.
pub fn execute(state: &ScheduleState, actions: &[Action], ctx: &ActionContext) -> ExecutionResult {
    let started = Instant::now();
    let mut draft = Draft {
        state: state.clone(),
        effects: Vec::new(),
        applied_all: true,
        active: ctx.active_person_id.clone(),
        ctx,
    };

    for action in actions {
        let outcome = draft.apply(action);
        let label = if outcome.is_ok() { "ok" } else { "rejected" };
        metrics::counter!(ACTIONS_TOTAL, "action" => action.label(), "outcome" => label).increment(1);
        if let Err(Rejected(line)) = outcome {
            tracing::debug!(action = action.label(), "rejected: {line}");
            draft.effects.push(line);
            draft.applied_all = false;
        }
    }

    let next_state = canonicalize(draft.state);
    let next_active_person_id = draft
        .active
        .filter(|id| next_state.person(id).is_some_and(|p| p.status == PersonStatus::Active));

    metrics::histogram!(EXECUTE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    ExecutionResult {
        next_state,
        effects: draft.effects,
        applied_all: draft.applied_all,
        next_active_person_id,
    }
}

impl Draft<'_> {
    fn apply(&mut self, action: &Action) -> Outcome {
        match action {
            Action::SetIdentity { name } => {
                self.set_identity(name);
                Ok(())
            }
            Action::AddPerson { name, phone, timezone, notes } => {
                self.add_person(name, phone, timezone.as_deref(), notes.as_deref())
            }
            Action::UpdatePerson { person, name, phone, timezone, notes } => self.update_person(
                person,
                name.as_deref(),
                phone.as_deref(),
                timezone.as_deref(),
                notes.as_deref(),
            ),
            Action::RemovePerson { person } => self.remove_person(person),
            Action::ReactivatePerson { person } => self.reactivate_person(person),
            Action::AddAppointment { desc, date, start_time, duration_mins, location, notes, people } => self
                .add_appointment(
                    desc,
                    date,
                    start_time.as_deref(),
                    *duration_mins,
                    location.as_deref(),
                    notes.as_deref(),
                    people,
                ),
            Action::DeleteAppointment { code } => self.delete_appointment(code),
            Action::UpdateAppointmentDesc { code, desc } => self.update_appointment_desc(code, desc),
            Action::SetAppointmentDate { code, date } => self.set_appointment_date(code, date),
            Action::SetAppointmentStartTime { code, start_time } => {
                self.set_appointment_start_time(code, start_time.as_deref())
            }
            Action::SetAppointmentDuration { code, duration_mins } => {
                self.set_appointment_duration(code, *duration_mins)
            }
            Action::RescheduleAppointment { code, date, start_time, duration_mins } => {
                self.reschedule_appointment(code, date, start_time.as_deref(), *duration_mins)
            }
            Action::SetAppointmentLocation { code, location } => self.set_appointment_location(code, location),
            Action::SetAppointmentNotes { code, notes } => self.set_appointment_notes(code, notes),
            Action::ReplaceAppointmentPeople { code, people } => {
                self.change_appointment_people(code, people, Membership::Replace)
            }
            Action::AddAppointmentPeople { code, people } => {
                self.change_appointment_people(code, people, Membership::Add)
            }
            Action::RemoveAppointmentPeople { code, people } => {
                self.change_appointment_people(code, people, Membership::Remove)
            }
            Action::AddRule { person, kind, date, start_time, duration_mins, desc } => self.add_rule(
                person,
                *kind,
                date,
                start_time.as_deref(),
                *duration_mins,
                desc.as_deref(),
            ),
            Action::DeleteRule { code } => self.delete_rule(code),
            Action::List { what } => {
                let text = self.render_list(*what);
                self.effects.push(text);
                Ok(())
            }
            Action::Show { code } => {
                let text = self.render_show(code);
                self.effects.push(text);
                Ok(())
            }
            Action::Help => {
                self.effects.push(super::queries::help_text());
                Ok(())
            }
            Action::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    pub(super) fn say(&mut self, line: impl Into<String>) {
        self.effects.push(line.into());
    }

    /// Append an advisory line for every assigned person with a conflicting rule.
    pub(super) fn warn_conflicts(&mut self, appt_index: usize) {
        let appt = &self.state.appointments[appt_index];
        let mut lines = Vec::new();
        for (pid, availability) in classify_appointment(appt, &self.state.availability_rules) {
            if availability.status != AvailabilityStatus::Conflict {
                continue;
            }
            let name = self.state.person(&pid).map_or(pid.as_str(), |p| p.name.as_str());
            lines.push(format!(
                "Warning: {name} is unavailable during {} ({})",
                appt.code,
                availability.blocking_codes().join(", ")
            ));
        }
        self.effects.extend(lines);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Membership {
    Replace,
    Add,
    Remove,
}
