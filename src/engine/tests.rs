use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use super::normalize::{canonicalize, normalize_at};
use super::*;
use crate::limits::*;
use crate::model::*;

const LA: &str = "America/Los_Angeles";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn ctx() -> ActionContext {
    ActionContext {
        now: now(),
        ..ActionContext::new(LA)
    }
}

fn base() -> ScheduleState {
    canonicalize(ScheduleState::empty("g", LA, now()))
}

fn actions(raw: Value) -> Vec<Action> {
    serde_json::from_value(raw).unwrap()
}

fn run(state: &ScheduleState, raw: Value) -> ExecutionResult {
    execute(state, &actions(raw), &ctx())
}

fn run_as(state: &ScheduleState, person: &str, raw: Value) -> ExecutionResult {
    execute(state, &actions(raw), &ctx().acting_as(person))
}

fn with_alex() -> ScheduleState {
    let r = run(&base(), json!([{"type": "add_person", "name": "Alex", "phone": "+14155550100"}]));
    assert!(r.applied_all, "{:?}", r.effects);
    r.next_state
}

fn with_people(n: usize) -> ScheduleState {
    let adds: Vec<Value> = (0..n)
        .map(|i| json!({"type": "add_person", "name": format!("P{i}"), "phone": format!("415555{i:04}")}))
        .collect();
    let r = run(&base(), Value::Array(adds));
    assert!(r.applied_all, "{:?}", r.effects);
    r.next_state
}

// ── End to end ───────────────────────────────────────────

#[test]
fn identity_then_dentist() {
    let state = with_alex();
    let r = run(
        &state,
        json!([
            {"type": "set_identity", "name": "Alex"},
            {"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "startTime": "09:00", "durationMins": 30}
        ]),
    );
    assert!(r.applied_all);
    assert_eq!(r.next_active_person_id.as_deref(), Some("alex"));
    assert_eq!(r.effects, vec!["You are Alex", "Added APPT-1 — Dentist on 2026-03-03 09:00 (30m)"]);

    let appt = &r.next_state.appointments[0];
    assert_eq!(appt.code, "APPT-1");
    assert!(!appt.is_all_day);
    assert_eq!(appt.start.as_deref(), Some("2026-03-03T09:00:00-08:00"));
    assert_eq!(appt.end.as_deref(), Some("2026-03-03T09:30:00-08:00"));
    assert_eq!(appt.timezone, LA);
}

#[test]
fn input_state_is_never_mutated() {
    let state = with_alex();
    let before = state.clone();
    let r = run(&state, json!([{"type": "remove_person", "person": "alex"}, {"type": "reset"}]));
    assert!(r.applied_all);
    assert_eq!(state, before);
    assert!(r.next_state.people.is_empty());
}

#[test]
fn later_actions_see_earlier_ones() {
    let r = run(
        &base(),
        json!([
            {"type": "add_person", "name": "Sam", "phone": "206 555 0101"},
            {"type": "add_appointment", "desc": "Soccer", "date": "2026-04-01", "people": ["sam"]},
            {"type": "update_appointment_desc", "code": "appt-1", "desc": "Soccer practice"}
        ]),
    );
    assert!(r.applied_all, "{:?}", r.effects);
    let appt = &r.next_state.appointments[0];
    assert_eq!(appt.title, "Soccer practice");
    assert_eq!(appt.people, vec!["sam"]);
    assert!(appt.is_all_day);
    assert_eq!(r.effects[1], "Added APPT-1 — Soccer on 2026-04-01 (all day) with Sam");
}

#[test]
fn one_bad_action_does_not_abort_the_batch() {
    let r = run(
        &base(),
        json!([
            {"type": "add_person", "name": "Bad", "phone": "12"},
            {"type": "add_person", "name": "Sam", "phone": "2065550101"}
        ]),
    );
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Invalid phone number: 12", "Added Sam at (206) 555-0101"]);
    assert_eq!(r.next_state.people.len(), 1);
}

// ── People ───────────────────────────────────────────────

#[test]
fn add_person_assigns_slug_and_phone() {
    let state = with_alex();
    let p = &state.people[0];
    assert_eq!(p.person_id, "alex");
    assert_eq!(p.cell_e164.as_deref(), Some("+14155550100"));
    assert_eq!(p.cell_display.as_deref(), Some("(415) 555-0100"));
    assert_eq!(p.status, PersonStatus::Active);
    assert_eq!(p.timezone, LA);
    assert_eq!(p.created_at, now());
}

#[test]
fn duplicate_name_is_rejected_case_insensitively() {
    let r = run(&with_alex(), json!([{"type": "add_person", "name": "ALEX", "phone": "2065550101"}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Name already in use: Alex"]);
    assert_eq!(r.next_state.people.len(), 1);
}

#[test]
fn non_ascii_names_collide_regardless_of_case() {
    let r = run(
        &base(),
        json!([
            {"type": "add_person", "name": "Élodie", "phone": "+14155550100"},
            {"type": "add_person", "name": "élodie", "phone": "+14155550101"},
            {"type": "set_identity", "name": "ÉLODIE"}
        ]),
    );
    assert!(!r.applied_all);
    assert_eq!(r.effects[1], "Name already in use: Élodie");
    assert_eq!(r.effects[2], "You are Élodie");
    assert_eq!(r.next_state.active_people().count(), 1);
}

#[test]
fn duplicate_phone_is_rejected() {
    let r = run(&with_alex(), json!([{"type": "add_person", "name": "Sam", "phone": "(415) 555-0100"}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Phone (415) 555-0100 already belongs to Alex"]);
}

#[test]
fn long_or_empty_names_are_rejected() {
    let long = "x".repeat(MAX_PERSON_NAME_LEN + 1);
    let r = run(
        &base(),
        json!([
            {"type": "add_person", "name": long, "phone": "2065550101"},
            {"type": "add_person", "name": "   ", "phone": "2065550102"}
        ]),
    );
    assert!(!r.applied_all);
    assert!(r.effects[0].starts_with("Name too long"));
    assert_eq!(r.effects[1], "A name is required");
    assert!(r.next_state.people.is_empty());
}

#[test]
fn active_people_are_capped() {
    let state = with_people(MAX_ACTIVE_PEOPLE);
    let r = run(&state, json!([{"type": "add_person", "name": "Extra", "phone": "2065550199"}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Cannot add Extra: the group already has 10 active people"]);
    assert_eq!(r.next_state.active_people().count(), MAX_ACTIVE_PEOPLE);

    // Removing someone frees a slot.
    let r = run(
        &state,
        json!([
            {"type": "remove_person", "person": "P3"},
            {"type": "add_person", "name": "Extra", "phone": "2065550199"}
        ]),
    );
    assert!(r.applied_all, "{:?}", r.effects);
    assert_eq!(r.next_state.active_people().count(), MAX_ACTIVE_PEOPLE);
    assert_eq!(r.next_state.people.len(), MAX_ACTIVE_PEOPLE + 1);
}

#[test]
fn context_cap_overrides_default() {
    let state = with_people(2);
    let ctx = ActionContext {
        max_active_people: 2,
        ..ctx()
    };
    let r = execute(
        &state,
        &actions(json!([{"type": "add_person", "name": "Third", "phone": "2065550199"}])),
        &ctx,
    );
    assert!(!r.applied_all);
}

#[test]
fn reactivation_rechecks_uniqueness() {
    let state = with_people(3);
    let r = run(
        &state,
        json!([
            {"type": "remove_person", "person": "p0"},
            {"type": "add_person", "name": "P0", "phone": "2065550199"},
            {"type": "reactivate_person", "person": "p0"}
        ]),
    );
    assert!(!r.applied_all);
    assert_eq!(r.effects[2], "Name already in use: P0");
    let old = r.next_state.person("p0").unwrap();
    assert_eq!(old.status, PersonStatus::Removed);
    assert_eq!(r.next_state.person("p0-2").unwrap().name, "P0");
}

#[test]
fn reactivation_rechecks_cap() {
    let state = with_people(MAX_ACTIVE_PEOPLE);
    let r = run(
        &state,
        json!([
            {"type": "remove_person", "person": "p0"},
            {"type": "add_person", "name": "New", "phone": "2065550199"},
            {"type": "reactivate_person", "person": "p0"}
        ]),
    );
    assert!(!r.applied_all);
    assert_eq!(r.effects[2], "Cannot add P0: the group already has 10 active people");
}

#[test]
fn update_person_changes_fields() {
    let r = run(
        &with_alex(),
        json!([{"type": "update_person", "person": "alex", "name": "Alexandra", "timezone": "America/New_York"}]),
    );
    assert!(r.applied_all, "{:?}", r.effects);
    assert_eq!(r.effects, vec!["Updated Alexandra"]);
    let p = r.next_state.person("alex").unwrap();
    assert_eq!(p.name, "Alexandra");
    assert_eq!(p.timezone, "America/New_York");
    assert_eq!(p.cell_e164.as_deref(), Some("+14155550100"));

    let r = run(&with_alex(), json!([{"type": "update_person", "person": "alex", "timezone": "Mars/Base"}]));
    assert_eq!(r.effects, vec!["Unknown timezone: Mars/Base"]);
}

#[test]
fn remove_person_unassigns_and_clears_identity() {
    let state = run(
        &with_alex(),
        json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "people": ["Alex"]}]),
    )
    .next_state;
    let r = run_as(&state, "alex", json!([{"type": "remove_person", "person": "Alex"}]));
    assert!(r.applied_all);
    assert_eq!(r.effects, vec!["Removed Alex (unassigned from APPT-1)"]);
    assert!(r.next_state.appointments[0].people.is_empty());
    assert_eq!(r.next_active_person_id, None);

    let again = run(&r.next_state, json!([{"type": "remove_person", "person": "alex"}]));
    assert!(!again.applied_all);
    assert_eq!(again.effects, vec!["Alex is already removed"]);
}

// ── Appointments ─────────────────────────────────────────

#[test]
fn unknown_code_reports_not_found() {
    let r = run(&base(), json!([{"type": "delete_appointment", "code": "appt-9"}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Not found: APPT-9"]);
}

#[test]
fn codes_are_matched_case_insensitively() {
    let state = run(&base(), json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03"}])).next_state;
    let r = run(&state, json!([{"type": "delete_appointment", "code": " appt-1 "}]));
    assert!(r.applied_all);
    assert_eq!(r.effects, vec!["Deleted APPT-1 — Dentist"]);
    assert!(r.next_state.appointments.is_empty());
}

#[test]
fn codes_grow_past_deleted_ones() {
    let r = run(
        &base(),
        json!([
            {"type": "add_appointment", "desc": "A", "date": "2026-03-03"},
            {"type": "add_appointment", "desc": "B", "date": "2026-03-04"},
            {"type": "delete_appointment", "code": "APPT-1"},
            {"type": "add_appointment", "desc": "C", "date": "2026-03-05"}
        ]),
    );
    let codes: Vec<&str> = r.next_state.appointments.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["APPT-2", "APPT-3"]);
}

#[test]
fn appointment_validation() {
    let r = run(
        &base(),
        json!([
            {"type": "add_appointment", "desc": "X", "date": "March 3"},
            {"type": "add_appointment", "desc": "X", "date": "2026-03-03", "startTime": "9am"},
            {"type": "add_appointment", "desc": "X", "date": "2026-03-03", "durationMins": 30},
            {"type": "add_appointment", "desc": "X", "date": "2026-03-03", "startTime": "09:00", "durationMins": 0},
            {"type": "add_appointment", "desc": "  ", "date": "2026-03-03"},
            {"type": "add_appointment", "desc": "X", "date": "2026-03-03", "people": ["nobody"]}
        ]),
    );
    assert!(!r.applied_all);
    assert_eq!(
        r.effects,
        vec![
            "Invalid date: March 3",
            "Invalid start time: 9am",
            "A duration needs a start time",
            "Invalid duration: 0 (1-1440 minutes)",
            "A description is required",
            "Not found: nobody",
        ]
    );
    assert!(r.next_state.appointments.is_empty());
}

#[test]
fn time_changes_rederive_instants() {
    let state = run(
        &base(),
        json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "startTime": "09:00", "durationMins": 30}]),
    )
    .next_state;

    let r = run(&state, json!([{"type": "set_appointment_duration", "code": "APPT-1", "durationMins": 90}]));
    assert_eq!(r.effects, vec!["APPT-1 is now 2026-03-03 09:00 (90m)"]);
    assert_eq!(r.next_state.appointments[0].end.as_deref(), Some("2026-03-03T10:30:00-08:00"));

    let r = run(&state, json!([{"type": "set_appointment_start_time", "code": "APPT-1"}]));
    let appt = &r.next_state.appointments[0];
    assert!(appt.is_all_day);
    assert_eq!(appt.duration_mins, None);
    assert_eq!(appt.start.as_deref(), Some("2026-03-03T00:00:00-08:00"));
    assert_eq!(appt.end.as_deref(), Some("2026-03-04T00:00:00-08:00"));

    let r = run(
        &state,
        json!([{"type": "reschedule_appointment", "code": "APPT-1", "date": "2026-07-01", "startTime": "14:15"}]),
    );
    let appt = &r.next_state.appointments[0];
    assert_eq!(appt.date.as_deref(), Some("2026-07-01"));
    assert_eq!(appt.duration_mins, None);
    assert_eq!(appt.start.as_deref(), Some("2026-07-01T14:15:00-07:00"));
    assert_eq!(appt.end.as_deref(), Some("2026-07-01T15:15:00-07:00"));
}

#[test]
fn duration_on_all_day_is_rejected() {
    let state = run(&base(), json!([{"type": "add_appointment", "desc": "Trip", "date": "2026-03-03"}])).next_state;
    let r = run(&state, json!([{"type": "set_appointment_duration", "code": "APPT-1", "durationMins": 30}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["APPT-1 is all-day; set a start time before a duration"]);
}

#[test]
fn location_and_notes() {
    let state = run(&base(), json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03"}])).next_state;
    let r = run(
        &state,
        json!([
            {"type": "set_appointment_location", "code": "APPT-1", "location": "  12  Main St\n Springfield "},
            {"type": "set_appointment_notes", "code": "APPT-1", "notes": "bring x-rays"}
        ]),
    );
    assert!(r.applied_all);
    let appt = &r.next_state.appointments[0];
    assert_eq!(appt.location, "12 Main St Springfield");
    assert_eq!(appt.location_map_query, "12 Main St Springfield");
    assert_eq!(appt.notes, "bring x-rays");
    assert_eq!(r.effects[0], "APPT-1 location: 12 Main St Springfield");
}

#[test]
fn appointment_people_edits() {
    let state = run(
        &base(),
        json!([
            {"type": "add_person", "name": "Alex", "phone": "4155550100"},
            {"type": "add_person", "name": "Sam", "phone": "4155550101"},
            {"type": "add_appointment", "desc": "Dinner", "date": "2026-03-03", "startTime": "18:00"}
        ]),
    )
    .next_state;

    let r = run(
        &state,
        json!([
            {"type": "add_appointment_people", "code": "APPT-1", "people": ["alex", "sam", "alex"]},
            {"type": "remove_appointment_people", "code": "APPT-1", "people": ["alex"]}
        ]),
    );
    assert!(r.applied_all);
    assert_eq!(r.next_state.appointments[0].people, vec!["sam"]);
    assert_eq!(r.effects, vec!["APPT-1 people: Alex, Sam", "APPT-1 people: Sam"]);

    let r = run(&state, json!([{"type": "replace_appointment_people", "code": "APPT-1", "people": []}]));
    assert_eq!(r.effects, vec!["APPT-1 people: (none)"]);
}

// ── Availability rules ───────────────────────────────────

#[test]
fn opposite_overlapping_rules_are_evicted() {
    let state = run(
        &with_alex(),
        json!([
            {"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03", "startTime": "09:00", "durationMins": 60},
            {"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03", "startTime": "15:00", "durationMins": 60}
        ]),
    )
    .next_state;

    let r = run(
        &state,
        json!([{"type": "add_rule", "person": "alex", "kind": "available", "date": "2026-03-03", "startTime": "09:30", "durationMins": 30}]),
    );
    assert!(r.applied_all);
    assert_eq!(
        r.effects,
        vec![
            "Removed RULE-1 (Alex unavailable 2026-03-03 09:00 (60m)), replaced by a newer available rule",
            "Added RULE-3 — Alex available 2026-03-03 09:30 (30m)",
        ]
    );
    let codes: Vec<&str> = r.next_state.availability_rules.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["RULE-2", "RULE-3"]);
}

#[test]
fn same_kind_and_other_dates_are_kept() {
    let r = run(
        &with_alex(),
        json!([
            {"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03"},
            {"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03", "startTime": "10:00"},
            {"type": "add_rule", "person": "alex", "kind": "available", "date": "2026-03-04"}
        ]),
    );
    assert!(r.applied_all);
    assert_eq!(r.next_state.availability_rules.len(), 3);
}

#[test]
fn rule_for_unknown_person_is_rejected() {
    let r = run(&base(), json!([{"type": "add_rule", "person": "ghost", "kind": "available", "date": "2026-03-03"}]));
    assert!(!r.applied_all);
    assert_eq!(r.effects, vec!["Not found: ghost"]);
}

#[test]
fn assigning_over_unavailability_warns() {
    let state = run(
        &with_alex(),
        json!([{"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03", "desc": "travel"}]),
    )
    .next_state;
    let r = run(
        &state,
        json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "startTime": "09:00", "people": ["Alex"]}]),
    );
    assert!(r.applied_all);
    assert_eq!(
        r.effects,
        vec![
            "Added APPT-1 — Dentist on 2026-03-03 09:00 with Alex",
            "Warning: Alex is unavailable during APPT-1 (RULE-1)",
        ]
    );
    // Advisory only: the appointment is still created.
    assert_eq!(r.next_state.appointments.len(), 1);
}

#[test]
fn delete_rule() {
    let state = run(&with_alex(), json!([{"type": "add_rule", "person": "alex", "kind": "available", "date": "2026-03-03"}]))
        .next_state;
    let r = run(&state, json!([{"type": "delete_rule", "code": "rule-1"}, {"type": "delete_rule", "code": "rule-1"}]));
    assert!(!r.applied_all);
    assert_eq!(
        r.effects,
        vec!["Deleted RULE-1 (Alex available 2026-03-03 (all day))", "Not found: RULE-1"]
    );
}

// ── Read-only actions ────────────────────────────────────

#[test]
fn read_only_actions_never_clear_applied_all() {
    let r = run(
        &with_alex(),
        json!([
            {"type": "show", "code": "APPT-404"},
            {"type": "set_identity", "name": "nobody"},
            {"type": "list"},
            {"type": "help"}
        ]),
    );
    assert!(r.applied_all);
    assert_eq!(r.effects[0], "Not found: APPT-404");
    assert_eq!(r.effects[1], "Not found: nobody");
    assert!(r.effects[2].starts_with("People:\n  Alex [alex] (415) 555-0100"));
    assert!(r.effects[3].starts_with("Commands:"));
}

#[test]
fn show_reports_availability() {
    let state = run(
        &with_alex(),
        json!([
            {"type": "add_rule", "person": "alex", "kind": "unavailable", "date": "2026-03-03", "startTime": "09:00"},
            {"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "startTime": "09:30", "people": ["alex"], "location": "Main St"}
        ]),
    )
    .next_state;
    let r = run(&state, json!([{"type": "show", "code": "appt-1"}]));
    let text = &r.effects[0];
    assert!(text.starts_with("APPT-1 Dentist\n  When: 2026-03-03 09:30"));
    assert!(text.contains("Where: Main St"));
    assert!(text.contains("Alex: conflict (RULE-1)"));
}

#[test]
fn reset_clears_everything_but_the_group() {
    let state = run(
        &with_alex(),
        json!([{"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03"}]),
    )
    .next_state;
    let r = run_as(&state, "alex", json!([{"type": "reset"}]));
    assert_eq!(r.effects, vec!["Reset: removed 1 people, 1 appointments, 0 rules"]);
    assert!(r.next_state.people.is_empty());
    assert!(r.next_state.appointments.is_empty());
    assert_eq!(r.next_state.group.group_id, "g");
    assert_eq!(r.next_active_person_id, None);
}

#[test]
fn executor_output_is_canonical() {
    let r = run(
        &with_alex(),
        json!([
            {"type": "add_appointment", "desc": "Dentist", "date": "2026-03-03", "startTime": "09:00", "people": ["alex"]},
            {"type": "add_rule", "person": "alex", "kind": "available", "date": "2026-03-03"}
        ]),
    );
    let raw = serde_json::to_value(&r.next_state).unwrap();
    assert_eq!(normalize_at(&raw, now()), r.next_state);
}

// ── Facade ───────────────────────────────────────────────

#[tokio::test]
async fn apply_saves_and_stale_batches_conflict() {
    let engine = Engine::in_memory();
    let add = actions(json!([{"type": "add_person", "name": "Alex", "phone": "4155550100"}]));
    let applied = engine.apply_actions("g", &add, &ctx()).await.unwrap();
    assert!(applied.saved);
    assert!(applied.result.applied_all);

    let loaded = engine.states.load("g").await.unwrap();
    assert_eq!(loaded.token, applied.token);
    assert_eq!(loaded.state.people.len(), 1);

    // Someone else writes between our load and save.
    let stale = engine.states.load("g").await.unwrap();
    engine.apply_actions("g", &actions(json!([{"type": "reset"}])), &ctx()).await.unwrap();
    let err = engine.states.save("g", &stale.state, &stale.token).await.unwrap_err();
    assert!(matches!(EngineError::from(err), EngineError::Conflict(_)));
}

#[tokio::test]
async fn read_only_batches_skip_the_write() {
    let engine = Engine::in_memory();
    let first = engine.states.load("g").await.unwrap();
    let applied = engine
        .apply_actions("g", &actions(json!([{"type": "list"}, {"type": "help"}])), &ctx())
        .await
        .unwrap();
    assert!(!applied.saved);
    assert_eq!(applied.token, first.token);
}

#[tokio::test]
async fn preview_does_not_write() {
    let engine = Engine::in_memory();
    let add = actions(json!([{"type": "add_person", "name": "Alex", "phone": "4155550100"}]));
    let preview = engine.preview_actions("g", &add, &ctx()).await.unwrap();
    assert_eq!(preview.next_state.people.len(), 1);
    assert!(engine.states.load("g").await.unwrap().state.people.is_empty());
}

#[tokio::test]
async fn oversized_batches_and_bad_groups_are_rejected() {
    let engine = Engine::in_memory();
    let many: Vec<Action> = (0..=MAX_BATCH_SIZE).map(|_| Action::Help).collect();
    assert!(matches!(
        engine.apply_actions("g", &many, &ctx()).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        engine.preview_actions("", &[], &ctx()).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Normalizer idempotence ───────────────────────────────

fn maybe<T: std::fmt::Debug + Clone + 'static>(s: impl Strategy<Value = T> + 'static) -> BoxedStrategy<Option<T>> {
    prop_oneof![Just(None), s.prop_map(Some)].boxed()
}

fn date() -> impl Strategy<Value = String> {
    prop_oneof![
        (2025i32..2028, 1u32..13, 1u32..29).prop_map(|(y, m, d)| format!("{y}-{m:02}-{d:02}")),
        Just("2026-03-08".to_string()),
        Just("2026-11-01".to_string()),
        Just("not a date".to_string()),
    ]
}

fn time() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..24, 0u32..60).prop_map(|(h, m)| format!("{h:02}:{m:02}")),
        Just("02:30".to_string()),
        Just("01:30:00".to_string()),
        Just("25:99".to_string()),
    ]
}

fn zone() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(LA.to_string()),
        Just("Europe/London".to_string()),
        Just("UTC".to_string()),
        Just("Nowhere/Special".to_string()),
        Just(String::new()),
    ]
}

fn person() -> impl Strategy<Value = Value> {
    (
        maybe(prop_oneof![Just("alex".to_string()), Just("sam".to_string()), "[a-z]{1,6}"]),
        prop_oneof![Just("Alex".to_string()), Just("  Sam  ".to_string()), Just("李".to_string()), "[A-Za-z ]{0,50}"],
        maybe(prop_oneof![Just("4155550100".to_string()), Just("+442071838750".to_string()), "[0-9+() -]{0,14}"]),
        prop_oneof![Just("active"), Just("removed"), Just("zombie")],
        zone(),
    )
        .prop_map(|(id, name, phone, status, tz)| {
            json!({"personId": id, "name": name, "cellE164": phone, "status": status, "timezone": tz})
        })
}

fn appointment() -> impl Strategy<Value = Value> {
    (
        maybe(prop_oneof![Just("APPT-1".to_string()), Just("appt-2".to_string()), Just("junk".to_string())]),
        maybe(prop_oneof![Just("a1".to_string()), Just("a2".to_string())]),
        "[A-Za-z ]{0,20}",
        maybe(date()),
        maybe(time()),
        maybe(0u32..2000),
        maybe(prop_oneof![
            Just("2026-03-03T09:00:00-08:00".to_string()),
            Just("2026-03-03".to_string()),
            Just("2026-03-03 10:15".to_string()),
        ]),
        zone(),
        prop::collection::vec(prop_oneof![Just("alex"), Just("sam"), Just("ghost")], 0..4),
        "[A-Za-z \n]{0,30}",
    )
        .prop_map(|(code, id, title, date, start_time, dur, legacy, tz, people, loc)| {
            json!({
                "code": code, "id": id, "title": title, "date": date, "startTime": start_time,
                "durationMins": dur, "start": legacy, "end": Value::Null, "timezone": tz,
                "people": people, "location": loc,
            })
        })
}

fn rule() -> impl Strategy<Value = Value> {
    (
        maybe(prop_oneof![Just("RULE-1".to_string()), Just("rule-1".to_string()), Just("RULE-x".to_string())]),
        prop_oneof![Just("alex"), Just("sam"), Just("ghost")],
        prop_oneof![Just("available"), Just("unavailable"), Just("maybe")],
        date(),
        maybe(time()),
        maybe(0u32..2000),
    )
        .prop_map(|(code, person, kind, date, start_time, dur)| {
            json!({"code": code, "personId": person, "kind": kind, "date": date, "startTime": start_time, "durationMins": dur})
        })
}

fn document() -> impl Strategy<Value = Value> {
    (
        zone(),
        prop::collection::vec(person(), 0..6),
        prop::collection::vec(
            (prop_oneof![Just("A@x.io"), Just("a@x.io "), Just("b@x.io")], prop_oneof![Just("active"), Just("invited"), Just("gone")])
                .prop_map(|(email, status)| json!({"email": email, "status": status})),
            0..4,
        ),
        prop::collection::vec(appointment(), 0..6),
        prop::collection::vec(rule(), 0..6),
    )
        .prop_map(|(tz, people, members, appointments, rules)| {
            json!({
                "group": {"groupId": "g", "timezone": tz},
                "people": people,
                "members": members,
                "appointments": appointments,
                "availabilityRules": rules,
            })
        })
}

proptest! {
    #[test]
    fn normalize_is_idempotent(doc in document()) {
        let once = normalize_at(&doc, now());
        let twice = normalize_at(&serde_json::to_value(&once).unwrap(), now());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn executing_nothing_changes_nothing(doc in document()) {
        let state = normalize_at(&doc, now());
        let r = execute(&state, &[], &ctx());
        prop_assert!(r.applied_all);
        prop_assert_eq!(r.next_state, state);
    }
}
