//! Canonicalization of schedule documents.
//!
//! Everything here is total: malformed entries are dropped or defaulted,
//! never reported. `normalize_at(normalize_at(d)) == normalize_at(d)` for
//! every input `d`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::limits::*;
use crate::model::*;

use super::interval::{derived_iso, format_date, format_time, from_legacy, parse_date, parse_time, parse_zone};
use super::text::{clamp, code_number, collapse_whitespace, display_phone, normalize_code, normalize_phone, slug, unique_id};

pub const APPOINTMENT_PREFIX: &str = "APPT";
pub const RULE_PREFIX: &str = "RULE";

pub fn normalize(raw: &Value) -> ScheduleState {
    normalize_at(raw, Utc::now())
}

/// Normalize with an explicit clock used only for absent timestamps.
pub fn normalize_at(raw: &Value, now: DateTime<Utc>) -> ScheduleState {
    canonicalize(coerce_state(raw, now))
}

// ── Lenient extraction ───────────────────────────────────

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    match field(obj, keys)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn time_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    let s = str_field(obj, keys)?;
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|d| d.with_timezone(&Utc))
}

fn array<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> impl Iterator<Item = &'a Map<String, Value>> {
    field(obj, keys)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn coerce_state(raw: &Value, now: DateTime<Utc>) -> ScheduleState {
    let empty = Map::new();
    let root = raw.as_object().unwrap_or(&empty);
    let group = root.get("group").and_then(Value::as_object).unwrap_or(root);

    ScheduleState {
        schema_version: SCHEMA_VERSION,
        group: GroupMeta {
            group_id: str_field(group, &["groupId"]).unwrap_or_default(),
            name: str_field(group, &["name", "groupName"]),
            timezone: str_field(group, &["timezone"]).unwrap_or_default(),
            created_at: time_field(group, &["createdAt"]).unwrap_or(now),
            updated_at: time_field(group, &["updatedAt"]).unwrap_or(now),
        },
        people: array(root, &["people"]).map(|p| coerce_person(p, now)).collect(),
        members: array(root, &["members"]).filter_map(coerce_member).collect(),
        appointments: array(root, &["appointments"]).map(coerce_appointment).collect(),
        availability_rules: array(root, &["availabilityRules", "rules"])
            .map(coerce_rule)
            .collect(),
    }
}

fn coerce_person(obj: &Map<String, Value>, now: DateTime<Utc>) -> Person {
    let status = match str_field(obj, &["status"]).as_deref() {
        Some("removed") => PersonStatus::Removed,
        _ => PersonStatus::Active,
    };
    Person {
        person_id: str_field(obj, &["personId", "id"]).unwrap_or_default(),
        name: str_field(obj, &["name"]).unwrap_or_default(),
        cell_e164: str_field(obj, &["cellE164", "phone"]),
        cell_display: str_field(obj, &["cellDisplay"]),
        status,
        timezone: str_field(obj, &["timezone"]).unwrap_or_default(),
        notes: str_field(obj, &["notes"]).unwrap_or_default(),
        created_at: time_field(obj, &["createdAt"]).unwrap_or(now),
    }
}

fn coerce_member(obj: &Map<String, Value>) -> Option<Member> {
    let email = str_field(obj, &["email", "userKey"])?;
    let status = match str_field(obj, &["status"]).as_deref() {
        Some("active") => MemberStatus::Active,
        Some("invited") => MemberStatus::Invited,
        _ => MemberStatus::Removed,
    };
    let role = match str_field(obj, &["role"]).as_deref() {
        Some("owner") => MemberRole::Owner,
        _ => MemberRole::Member,
    };
    Some(Member {
        email,
        status,
        role,
        joined_at: time_field(obj, &["joinedAt"]),
    })
}

fn coerce_appointment(obj: &Map<String, Value>) -> Appointment {
    let people = field(obj, &["people"])
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let scan_status = match str_field(obj, &["scanStatus"]).as_deref() {
        Some("pending") => Some(ScanStatus::Pending),
        Some("parsed") => Some(ScanStatus::Parsed),
        Some("failed") => Some(ScanStatus::Failed),
        _ => None,
    };
    Appointment {
        id: str_field(obj, &["id"]).unwrap_or_default(),
        code: str_field(obj, &["code"]).unwrap_or_default(),
        title: str_field(obj, &["title", "desc"]).unwrap_or_default(),
        date: str_field(obj, &["date"]),
        start_time: str_field(obj, &["startTime"]),
        duration_mins: u32_field(obj, &["durationMins"]),
        is_all_day: false,
        start: str_field(obj, &["start"]),
        end: str_field(obj, &["end"]),
        timezone: str_field(obj, &["timezone"]).unwrap_or_default(),
        people,
        location_raw: str_field(obj, &["locationRaw"]).unwrap_or_default(),
        location: str_field(obj, &["location"]).unwrap_or_default(),
        location_map_query: String::new(),
        notes: str_field(obj, &["notes"]).unwrap_or_default(),
        scan_image_key: str_field(obj, &["scanImageKey"]),
        scan_status,
        scan_captured_at: time_field(obj, &["scanCapturedAt"]),
    }
}

fn coerce_rule(obj: &Map<String, Value>) -> AvailabilityRule {
    // Unknown kinds become blocking; a spurious warning beats a missed one.
    let kind = match str_field(obj, &["kind"]).as_deref() {
        Some("available") => RuleKind::Available,
        _ => RuleKind::Unavailable,
    };
    AvailabilityRule {
        code: str_field(obj, &["code"]).unwrap_or_default(),
        person_id: str_field(obj, &["personId"]).unwrap_or_default(),
        kind,
        date: str_field(obj, &["date"]).unwrap_or_default(),
        start_time: str_field(obj, &["startTime"]),
        duration_mins: u32_field(obj, &["durationMins"]),
        timezone: str_field(obj, &["timezone"]).unwrap_or_default(),
        desc: str_field(obj, &["desc"]).unwrap_or_default(),
    }
}

// ── Canonical form ───────────────────────────────────────

/// Enforce collection invariants and recompute derived fields.
pub fn canonicalize(mut state: ScheduleState) -> ScheduleState {
    state.schema_version = SCHEMA_VERSION;
    state.group.group_id = state.group.group_id.trim().to_string();
    state.group.name = state
        .group
        .name
        .as_deref()
        .map(|n| clamp(n, MAX_TITLE_LEN))
        .filter(|n| !n.is_empty());
    state.group.timezone = valid_zone(&state.group.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    if state.group.updated_at < state.group.created_at {
        state.group.updated_at = state.group.created_at;
    }

    let group_tz = state.group.timezone.clone();
    state.people = canonical_people(std::mem::take(&mut state.people), &group_tz);
    state.members = canonical_members(std::mem::take(&mut state.members));

    let person_zones: HashMap<String, String> = state
        .people
        .iter()
        .map(|p| (p.person_id.clone(), p.timezone.clone()))
        .collect();
    state.appointments = canonical_appointments(std::mem::take(&mut state.appointments), &group_tz, &person_zones);
    state.availability_rules =
        canonical_rules(std::mem::take(&mut state.availability_rules), &group_tz, &person_zones);
    state
}

fn valid_zone(tz: &str) -> Option<String> {
    parse_zone(tz).map(|z| z.name().to_string())
}

fn canonical_time(t: Option<&str>) -> Option<String> {
    t.and_then(parse_time).map(format_time)
}

fn canonical_date(d: Option<&str>) -> Option<String> {
    d.and_then(parse_date).map(format_date)
}

/// Durations only mean something alongside a start time.
fn canonical_duration(start_time: Option<&String>, mins: Option<u32>) -> Option<u32> {
    start_time.and(mins).filter(|m| *m <= MAX_DURATION_MINS)
}

fn person_priority(s: PersonStatus) -> u8 {
    match s {
        PersonStatus::Active => 1,
        PersonStatus::Removed => 0,
    }
}

fn canonical_people(people: Vec<Person>, group_tz: &str) -> Vec<Person> {
    let explicit: HashSet<String> = people
        .iter()
        .map(|p| p.person_id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    let mut out: Vec<Person> = Vec::with_capacity(people.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut taken = explicit;
    let mut sequence = 0usize;

    for mut p in people {
        p.name = clamp(&p.name, MAX_PERSON_NAME_LEN);
        if p.name.is_empty() {
            continue;
        }
        p.person_id = p.person_id.trim().to_string();
        if p.person_id.is_empty() {
            let base = slug(&p.name).unwrap_or_else(|| {
                sequence += 1;
                format!("person-{sequence}")
            });
            p.person_id = unique_id(&base, |c| taken.contains(c));
            taken.insert(p.person_id.clone());
        }
        p.notes = clamp(&p.notes, MAX_NOTES_LEN);
        p.timezone = valid_zone(&p.timezone).unwrap_or_else(|| group_tz.to_string());
        p.cell_e164 = p.cell_e164.as_deref().and_then(normalize_phone);
        p.cell_display = p.cell_e164.as_deref().map(display_phone);

        match index.get(&p.person_id) {
            Some(&i) => {
                if person_priority(p.status) > person_priority(out[i].status) {
                    out[i] = p;
                }
            }
            None => {
                index.insert(p.person_id.clone(), out.len());
                out.push(p);
            }
        }
    }
    out
}

fn canonical_members(members: Vec<Member>) -> Vec<Member> {
    let mut out: Vec<Member> = Vec::with_capacity(members.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for mut m in members {
        m.email = m.email.trim().to_lowercase();
        if m.email.is_empty() {
            continue;
        }
        match index.get(&m.email) {
            Some(&i) => {
                if m.status > out[i].status {
                    out[i] = m;
                }
            }
            None => {
                index.insert(m.email.clone(), out.len());
                out.push(m);
            }
        }
    }
    out
}

/// Keep valid unique codes; reallocate the rest above the max.
fn assign_codes(codes: &mut [String], prefix: &str) {
    let mut seen = HashSet::new();
    let mut needs: Vec<usize> = Vec::new();
    for (i, code) in codes.iter_mut().enumerate() {
        *code = normalize_code(code);
        if code_number(code, prefix).is_some() && seen.insert(code.clone()) {
            continue;
        }
        needs.push(i);
    }
    let mut next = codes
        .iter()
        .enumerate()
        .filter(|(i, _)| !needs.contains(i))
        .filter_map(|(_, c)| code_number(c, prefix))
        .max()
        .unwrap_or(0);
    for i in needs {
        next += 1;
        codes[i] = format!("{prefix}-{next}");
    }
}

pub fn apply_location(appt: &mut Appointment, raw: &str) {
    appt.location_raw = clamp(raw, MAX_LOCATION_LEN);
    appt.location = collapse_whitespace(&appt.location_raw);
    appt.location_map_query = appt.location.clone();
}

/// Recompute `isAllDay`, `start`, `end` from the structured time fields.
pub fn derive_times(appt: &mut Appointment) {
    appt.date = canonical_date(appt.date.as_deref());
    appt.start_time = canonical_time(appt.start_time.as_deref());
    appt.duration_mins = canonical_duration(appt.start_time.as_ref(), appt.duration_mins);
    appt.is_all_day = appt.start_time.is_none();
    match derived_iso(&appt.timing()) {
        Some((start, end)) => {
            appt.start = Some(start);
            appt.end = Some(end);
        }
        None => {
            appt.start = None;
            appt.end = None;
        }
    }
}

fn canonical_appointments(
    appts: Vec<Appointment>,
    group_tz: &str,
    person_zones: &HashMap<String, String>,
) -> Vec<Appointment> {
    let mut seen_ids = HashSet::new();
    let mut appts: Vec<Appointment> = appts
        .into_iter()
        .filter(|a| {
            let id = a.id.trim();
            id.is_empty() || seen_ids.insert(id.to_string())
        })
        .collect();

    let mut codes: Vec<String> = appts.iter().map(|a| a.code.clone()).collect();
    assign_codes(&mut codes, APPOINTMENT_PREFIX);

    let mut taken: HashSet<String> = appts.iter().map(|a| a.id.trim().to_string()).collect();
    for (a, code) in appts.iter_mut().zip(codes) {
        a.code = code;
        a.id = a.id.trim().to_string();
        if a.id.is_empty() {
            let base = format!("appt-{}", code_number(&a.code, APPOINTMENT_PREFIX).unwrap_or(0));
            a.id = unique_id(&base, |c| taken.contains(c));
            taken.insert(a.id.clone());
        }
        a.title = clamp(&a.title, MAX_TITLE_LEN);
        a.timezone = valid_zone(&a.timezone).unwrap_or_else(|| group_tz.to_string());

        let has_date = canonical_date(a.date.as_deref()).is_some();
        if !has_date
            && let Some(legacy_start) = a.start.clone()
            && let Some(zone) = parse_zone(&a.timezone)
            && let Some((date, start_time, dur)) = from_legacy(&legacy_start, a.end.as_deref(), zone)
        {
            a.date = Some(date);
            a.start_time = start_time;
            a.duration_mins = dur;
        }
        derive_times(a);

        let mut assigned = HashSet::new();
        a.people
            .retain(|pid| person_zones.contains_key(pid) && assigned.insert(pid.clone()));

        let raw = if a.location_raw.trim().is_empty() {
            a.location.clone()
        } else {
            a.location_raw.clone()
        };
        apply_location(a, &raw);
        a.notes = clamp(&a.notes, MAX_NOTES_LEN);
        a.scan_image_key = a.scan_image_key.take().filter(|k| !k.trim().is_empty());
    }
    appts
}

fn canonical_rules(
    rules: Vec<AvailabilityRule>,
    group_tz: &str,
    person_zones: &HashMap<String, String>,
) -> Vec<AvailabilityRule> {
    let mut rules: Vec<AvailabilityRule> = rules
        .into_iter()
        .filter_map(|mut r| {
            r.person_id = r.person_id.trim().to_string();
            let person_tz = person_zones.get(&r.person_id)?;
            r.date = canonical_date(Some(r.date.as_str()))?;
            r.start_time = canonical_time(r.start_time.as_deref());
            r.duration_mins = canonical_duration(r.start_time.as_ref(), r.duration_mins);
            r.timezone = valid_zone(&r.timezone)
                .or_else(|| valid_zone(person_tz))
                .unwrap_or_else(|| group_tz.to_string());
            r.desc = clamp(&r.desc, MAX_RULE_DESC_LEN);
            Some(r)
        })
        .collect();

    let mut codes: Vec<String> = rules.iter().map(|r| r.code.clone()).collect();
    assign_codes(&mut codes, RULE_PREFIX);
    for (r, code) in rules.iter_mut().zip(codes) {
        r.code = code;
    }
    rules
}
