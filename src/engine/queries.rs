use std::fmt::Write;

use crate::model::*;

use super::actions::ListTarget;
use super::availability::{classify_appointment, AvailabilityStatus};
use super::executor::Draft;
use super::text::normalize_code;

/// `2026-03-03 09:00 (30m)`, `2026-03-03 09:00`, or `2026-03-03 (all day)`.
pub(super) fn describe_when(t: &Timing<'_>) -> String {
    let date = t.date.unwrap_or("(no date)");
    match (t.start_time, t.duration_mins) {
        (Some(start), Some(d)) => format!("{date} {start} ({d}m)"),
        (Some(start), None) => format!("{date} {start}"),
        (None, _) => format!("{date} (all day)"),
    }
}

pub(super) fn describe_rule(state: &ScheduleState, rule: &AvailabilityRule) -> String {
    let who = state
        .person(&rule.person_id)
        .map_or(rule.person_id.as_str(), |p| p.name.as_str());
    let mut line = format!("{who} {} {}", rule.kind.as_str(), describe_when(&rule.timing()));
    if !rule.desc.is_empty() {
        let _ = write!(line, ": {}", rule.desc);
    }
    line
}

fn names(state: &ScheduleState, ids: &[String]) -> String {
    ids.iter()
        .map(|id| state.person(id).map_or(id.as_str(), |p| p.name.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn people_section(state: &ScheduleState, out: &mut String) {
    out.push_str("People:");
    if state.people.is_empty() {
        out.push_str(" (none)");
    }
    for p in &state.people {
        let _ = write!(out, "\n  {} [{}]", p.name, p.person_id);
        if let Some(display) = &p.cell_display {
            let _ = write!(out, " {display}");
        }
        if p.status == PersonStatus::Removed {
            out.push_str(" (removed)");
        }
    }
}

fn appointments_section(state: &ScheduleState, out: &mut String) {
    out.push_str("Appointments:");
    if state.appointments.is_empty() {
        out.push_str(" (none)");
    }
    for a in &state.appointments {
        let _ = write!(out, "\n  {} {} on {}", a.code, a.title, describe_when(&a.timing()));
        if !a.people.is_empty() {
            let _ = write!(out, " with {}", names(state, &a.people));
        }
    }
}

fn rules_section(state: &ScheduleState, out: &mut String) {
    out.push_str("Rules:");
    if state.availability_rules.is_empty() {
        out.push_str(" (none)");
    }
    for r in &state.availability_rules {
        let _ = write!(out, "\n  {} {}", r.code, describe_rule(state, r));
    }
}

pub(super) fn help_text() -> String {
    [
        "Commands:",
        "  add_person / update_person / remove_person / reactivate_person",
        "  add_appointment / delete_appointment / reschedule_appointment",
        "  set_appointment_date / set_appointment_start_time / set_appointment_duration",
        "  set_appointment_location / set_appointment_notes / update_appointment_desc",
        "  replace_appointment_people / add_appointment_people / remove_appointment_people",
        "  add_rule / delete_rule",
        "  set_identity / list / show / help / reset",
    ]
    .join("\n")
}

impl Draft<'_> {
    pub(super) fn render_list(&self, what: ListTarget) -> String {
        let mut out = String::new();
        match what {
            ListTarget::People => people_section(&self.state, &mut out),
            ListTarget::Appointments => appointments_section(&self.state, &mut out),
            ListTarget::Rules => rules_section(&self.state, &mut out),
            ListTarget::All => {
                people_section(&self.state, &mut out);
                out.push('\n');
                appointments_section(&self.state, &mut out);
                out.push('\n');
                rules_section(&self.state, &mut out);
            }
        }
        out
    }

    /// Detail view of one appointment or rule by code.
    pub(super) fn render_show(&self, code: &str) -> String {
        let code = normalize_code(code);
        if let Some(rule) = self.state.availability_rules.iter().find(|r| r.code == code) {
            return format!("{} {}", rule.code, describe_rule(&self.state, rule));
        }
        let Some(a) = self.state.appointment_by_code(&code) else {
            return format!("Not found: {code}");
        };

        let mut out = format!("{} {}\n  When: {}", a.code, a.title, describe_when(&a.timing()));
        if let (Some(start), Some(end)) = (&a.start, &a.end) {
            let _ = write!(out, "\n  Instants: {start} to {end}");
        }
        if !a.location.is_empty() {
            let _ = write!(out, "\n  Where: {}", a.location);
        }
        if !a.notes.is_empty() {
            let _ = write!(out, "\n  Notes: {}", a.notes);
        }
        for (pid, availability) in classify_appointment(a, &self.state.availability_rules) {
            let name = self.state.person(&pid).map_or(pid.as_str(), |p| p.name.as_str());
            let _ = write!(out, "\n  {name}: {}", availability.status.as_str());
            if availability.status == AvailabilityStatus::Conflict {
                let _ = write!(out, " ({})", availability.blocking_codes().join(", "));
            }
        }
        out
    }
}
