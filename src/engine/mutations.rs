use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::executor::{Draft, Membership, Outcome, Rejected};
use super::interval::{bounds, format_time, parse_date, parse_time, parse_zone};
use super::normalize::{apply_location, derive_times, APPOINTMENT_PREFIX, RULE_PREFIX};
use super::queries::{describe_rule, describe_when};
use super::text::{clamp, display_phone, next_code, normalize_code, normalize_phone, same_name, slug, unique_id};

fn not_found(what: &str) -> Rejected {
    Rejected(format!("Not found: {what}"))
}

fn check_date(date: &str) -> Result<String, Rejected> {
    parse_date(date)
        .map(super::interval::format_date)
        .ok_or_else(|| Rejected(format!("Invalid date: {date}")))
}

fn check_time(time: Option<&str>) -> Result<Option<String>, Rejected> {
    time.map(|t| {
        parse_time(t)
            .map(format_time)
            .ok_or_else(|| Rejected(format!("Invalid start time: {t}")))
    })
    .transpose()
}

fn check_duration(start_time: Option<&String>, mins: Option<u32>) -> Result<Option<u32>, Rejected> {
    match mins {
        None => Ok(None),
        Some(_) if start_time.is_none() => Err(Rejected("A duration needs a start time".into())),
        Some(m) if m == 0 || m > MAX_DURATION_MINS => Err(Rejected(format!(
            "Invalid duration: {m} (1-{MAX_DURATION_MINS} minutes)"
        ))),
        Some(m) => Ok(Some(m)),
    }
}

fn check_zone(tz: &str) -> Result<String, Rejected> {
    parse_zone(tz)
        .map(|z| z.name().to_string())
        .ok_or_else(|| Rejected(format!("Unknown timezone: {tz}")))
}

fn check_name(name: &str) -> Result<&str, Rejected> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Rejected("A name is required".into()));
    }
    if name.chars().count() > MAX_PERSON_NAME_LEN {
        return Err(Rejected(format!(
            "Name too long (max {MAX_PERSON_NAME_LEN} characters): {name}"
        )));
    }
    Ok(name)
}

fn check_phone(phone: &str) -> Result<String, Rejected> {
    normalize_phone(phone).ok_or_else(|| Rejected(format!("Invalid phone number: {phone}")))
}

impl Draft<'_> {
    // ── Lookup ───────────────────────────────────────────────

    /// Resolve a person reference (id, or case-insensitive name).
    ///
    /// Active people win name ties against removed ones.
    pub(super) fn find_person(&self, reference: &str) -> Option<usize> {
        let reference = reference.trim();
        let people = &self.state.people;
        people
            .iter()
            .position(|p| p.person_id == reference)
            .or_else(|| {
                people.iter().position(|p| {
                    p.status == PersonStatus::Active && same_name(&p.name, reference)
                })
            })
            .or_else(|| people.iter().position(|p| same_name(&p.name, reference)))
    }

    fn find_active_person_id(&self, reference: &str) -> Option<String> {
        self.find_person(reference)
            .map(|i| &self.state.people[i])
            .filter(|p| p.status == PersonStatus::Active)
            .map(|p| p.person_id.clone())
    }

    fn find_appointment(&self, code: &str) -> Result<usize, Rejected> {
        let code = normalize_code(code);
        self.state
            .appointments
            .iter()
            .position(|a| a.code == code)
            .ok_or_else(|| not_found(&code))
    }

    fn active_name_owner(&self, name: &str, except: Option<&str>) -> Option<&Person> {
        self.state
            .active_people()
            .find(|p| Some(p.person_id.as_str()) != except && same_name(&p.name, name))
    }

    fn active_phone_owner(&self, e164: &str, except: Option<&str>) -> Option<&Person> {
        self.state.active_people().find(|p| {
            Some(p.person_id.as_str()) != except && p.cell_e164.as_deref() == Some(e164)
        })
    }

    fn check_unique(&self, name: &str, e164: Option<&str>, except: Option<&str>) -> Outcome {
        if let Some(owner) = self.active_name_owner(name, except) {
            return Err(Rejected(format!("Name already in use: {}", owner.name)));
        }
        if let Some(e164) = e164
            && let Some(owner) = self.active_phone_owner(e164, except)
        {
            return Err(Rejected(format!(
                "Phone {} already belongs to {}",
                display_phone(e164),
                owner.name
            )));
        }
        Ok(())
    }

    fn check_capacity(&self, name: &str) -> Outcome {
        let cap = self.ctx.max_active_people;
        if self.state.active_people().count() >= cap {
            return Err(Rejected(format!(
                "Cannot add {name}: the group already has {cap} active people"
            )));
        }
        Ok(())
    }

    fn resolve_people(&self, refs: &[String]) -> Result<Vec<String>, Rejected> {
        let mut ids: Vec<String> = Vec::with_capacity(refs.len());
        for r in refs {
            let id = self.find_active_person_id(r).ok_or_else(|| not_found(r.trim()))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn person_names(&self, ids: &[String]) -> String {
        if ids.is_empty() {
            return "(none)".into();
        }
        ids.iter()
            .map(|id| self.state.person(id).map_or(id.as_str(), |p| p.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ── People ───────────────────────────────────────────────

    pub(super) fn add_person(
        &mut self,
        name: &str,
        phone: &str,
        timezone: Option<&str>,
        notes: Option<&str>,
    ) -> Outcome {
        let name = check_name(name)?;
        self.check_unique(name, None, None)?;
        self.check_capacity(name)?;
        let e164 = check_phone(phone)?;
        self.check_unique(name, Some(&e164), None)?;
        let timezone = match timezone {
            Some(tz) => check_zone(tz)?,
            None => self.ctx.timezone.clone(),
        };

        let base = slug(name).unwrap_or_else(|| format!("person-{}", self.state.people.len() + 1));
        let person_id = unique_id(&base, |c| self.state.person(c).is_some());
        let display = display_phone(&e164);
        self.state.people.push(Person {
            person_id,
            name: name.to_string(),
            cell_e164: Some(e164),
            cell_display: Some(display.clone()),
            status: PersonStatus::Active,
            timezone,
            notes: clamp(notes.unwrap_or_default(), MAX_NOTES_LEN),
            created_at: self.ctx.now,
        });
        self.say(format!("Added {name} at {display}"));
        Ok(())
    }

    pub(super) fn update_person(
        &mut self,
        reference: &str,
        name: Option<&str>,
        phone: Option<&str>,
        timezone: Option<&str>,
        notes: Option<&str>,
    ) -> Outcome {
        let idx = self.find_person(reference).ok_or_else(|| not_found(reference.trim()))?;
        if name.is_none() && phone.is_none() && timezone.is_none() && notes.is_none() {
            return Err(Rejected(format!("Nothing to update for {}", self.state.people[idx].name)));
        }
        let current = self.state.people[idx].clone();
        let new_name = name.map(check_name).transpose()?.unwrap_or(&current.name).to_string();
        let new_phone = phone.map(check_phone).transpose()?.or(current.cell_e164.clone());
        let new_zone = timezone.map(check_zone).transpose()?.unwrap_or(current.timezone.clone());
        if current.status == PersonStatus::Active {
            self.check_unique(&new_name, new_phone.as_deref(), Some(&current.person_id))?;
        }

        let p = &mut self.state.people[idx];
        p.name = new_name;
        p.cell_display = new_phone.as_deref().map(display_phone);
        p.cell_e164 = new_phone;
        p.timezone = new_zone;
        if let Some(notes) = notes {
            p.notes = clamp(notes, MAX_NOTES_LEN);
        }
        let line = format!("Updated {}", p.name);
        self.say(line);
        Ok(())
    }

    pub(super) fn remove_person(&mut self, reference: &str) -> Outcome {
        let idx = self.find_person(reference).ok_or_else(|| not_found(reference.trim()))?;
        let person = &self.state.people[idx];
        if person.status == PersonStatus::Removed {
            return Err(Rejected(format!("{} is already removed", person.name)));
        }
        let id = person.person_id.clone();
        let name = person.name.clone();

        self.state.people[idx].status = PersonStatus::Removed;
        let mut unassigned = Vec::new();
        for appt in &mut self.state.appointments {
            let before = appt.people.len();
            appt.people.retain(|p| p != &id);
            if appt.people.len() != before {
                unassigned.push(appt.code.clone());
            }
        }
        if self.active.as_deref() == Some(id.as_str()) {
            self.active = None;
        }
        if unassigned.is_empty() {
            self.say(format!("Removed {name}"));
        } else {
            self.say(format!("Removed {name} (unassigned from {})", unassigned.join(", ")));
        }
        Ok(())
    }

    pub(super) fn reactivate_person(&mut self, reference: &str) -> Outcome {
        let idx = self.find_person(reference).ok_or_else(|| not_found(reference.trim()))?;
        let person = self.state.people[idx].clone();
        if person.status == PersonStatus::Active {
            return Err(Rejected(format!("{} is already active", person.name)));
        }
        self.check_capacity(&person.name)?;
        self.check_unique(&person.name, person.cell_e164.as_deref(), Some(&person.person_id))?;
        self.state.people[idx].status = PersonStatus::Active;
        self.say(format!("Reactivated {}", person.name));
        Ok(())
    }

    // ── Appointments ─────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub(super) fn add_appointment(
        &mut self,
        desc: &str,
        date: &str,
        start_time: Option<&str>,
        duration_mins: Option<u32>,
        location: Option<&str>,
        notes: Option<&str>,
        people: &[String],
    ) -> Outcome {
        let title = clamp(desc, MAX_TITLE_LEN);
        if title.is_empty() {
            return Err(Rejected("A description is required".into()));
        }
        let date = check_date(date)?;
        let start_time = check_time(start_time)?;
        let duration_mins = check_duration(start_time.as_ref(), duration_mins)?;
        let people = self.resolve_people(people)?;
        let timezone = parse_zone(&self.ctx.timezone)
            .map(|z| z.name().to_string())
            .unwrap_or_else(|| self.state.group.timezone.clone());

        let code = next_code(
            APPOINTMENT_PREFIX,
            self.state.appointments.iter().map(|a| a.code.as_str()),
        );
        let mut appt = Appointment {
            id: Ulid::new().to_string(),
            code,
            title,
            date: Some(date),
            start_time,
            duration_mins,
            is_all_day: false,
            start: None,
            end: None,
            timezone,
            people,
            location_raw: String::new(),
            location: String::new(),
            location_map_query: String::new(),
            notes: clamp(notes.unwrap_or_default(), MAX_NOTES_LEN),
            scan_image_key: None,
            scan_status: None,
            scan_captured_at: None,
        };
        apply_location(&mut appt, location.unwrap_or_default());
        derive_times(&mut appt);

        let mut line = format!("Added {} — {} on {}", appt.code, appt.title, describe_when(&appt.timing()));
        if !appt.people.is_empty() {
            line.push_str(&format!(" with {}", self.person_names(&appt.people)));
        }
        self.state.appointments.push(appt);
        self.say(line);
        self.warn_conflicts(self.state.appointments.len() - 1);
        Ok(())
    }

    pub(super) fn delete_appointment(&mut self, code: &str) -> Outcome {
        let idx = self.find_appointment(code)?;
        let appt = self.state.appointments.remove(idx);
        self.say(format!("Deleted {} — {}", appt.code, appt.title));
        Ok(())
    }

    pub(super) fn update_appointment_desc(&mut self, code: &str, desc: &str) -> Outcome {
        let idx = self.find_appointment(code)?;
        let title = clamp(desc, MAX_TITLE_LEN);
        if title.is_empty() {
            return Err(Rejected("A description is required".into()));
        }
        let appt = &mut self.state.appointments[idx];
        appt.title = title;
        let line = format!("Renamed {} to {}", appt.code, appt.title);
        self.say(line);
        Ok(())
    }

    /// Write new time fields, re-derive instants, and report the result.
    fn retime(&mut self, idx: usize, date: Option<String>, start_time: Option<String>, duration: Option<u32>) {
        let appt = &mut self.state.appointments[idx];
        appt.date = date;
        appt.start_time = start_time;
        appt.duration_mins = duration;
        derive_times(appt);
        let line = format!("{} is now {}", appt.code, describe_when(&appt.timing()));
        self.say(line);
        self.warn_conflicts(idx);
    }

    pub(super) fn set_appointment_date(&mut self, code: &str, date: &str) -> Outcome {
        let idx = self.find_appointment(code)?;
        let date = check_date(date)?;
        let appt = &self.state.appointments[idx];
        let (start_time, duration) = (appt.start_time.clone(), appt.duration_mins);
        self.retime(idx, Some(date), start_time, duration);
        Ok(())
    }

    pub(super) fn set_appointment_start_time(&mut self, code: &str, start_time: Option<&str>) -> Outcome {
        let idx = self.find_appointment(code)?;
        let start_time = check_time(start_time)?;
        let appt = &self.state.appointments[idx];
        let date = appt.date.clone();
        // Going all-day drops the duration with the start time.
        let duration = start_time.as_ref().and(appt.duration_mins);
        self.retime(idx, date, start_time, duration);
        Ok(())
    }

    pub(super) fn set_appointment_duration(&mut self, code: &str, duration_mins: Option<u32>) -> Outcome {
        let idx = self.find_appointment(code)?;
        let appt = &self.state.appointments[idx];
        if duration_mins.is_some() && appt.start_time.is_none() {
            return Err(Rejected(format!(
                "{} is all-day; set a start time before a duration",
                appt.code
            )));
        }
        let duration = check_duration(appt.start_time.as_ref(), duration_mins)?;
        let (date, start_time) = (appt.date.clone(), appt.start_time.clone());
        self.retime(idx, date, start_time, duration);
        Ok(())
    }

    pub(super) fn reschedule_appointment(
        &mut self,
        code: &str,
        date: &str,
        start_time: Option<&str>,
        duration_mins: Option<u32>,
    ) -> Outcome {
        let idx = self.find_appointment(code)?;
        let date = check_date(date)?;
        let start_time = check_time(start_time)?;
        let duration = check_duration(start_time.as_ref(), duration_mins)?;
        self.retime(idx, Some(date), start_time, duration);
        Ok(())
    }

    pub(super) fn set_appointment_location(&mut self, code: &str, location: &str) -> Outcome {
        let idx = self.find_appointment(code)?;
        let appt = &mut self.state.appointments[idx];
        apply_location(appt, location);
        let line = if appt.location.is_empty() {
            format!("Cleared location for {}", appt.code)
        } else {
            format!("{} location: {}", appt.code, appt.location)
        };
        self.say(line);
        Ok(())
    }

    pub(super) fn set_appointment_notes(&mut self, code: &str, notes: &str) -> Outcome {
        let idx = self.find_appointment(code)?;
        let appt = &mut self.state.appointments[idx];
        appt.notes = clamp(notes, MAX_NOTES_LEN);
        let line = format!("Updated notes for {}", appt.code);
        self.say(line);
        Ok(())
    }

    pub(super) fn change_appointment_people(&mut self, code: &str, refs: &[String], op: Membership) -> Outcome {
        let idx = self.find_appointment(code)?;
        let ids = self.resolve_people(refs)?;
        let appt = &mut self.state.appointments[idx];
        match op {
            Membership::Replace => appt.people = ids,
            Membership::Add => {
                for id in ids {
                    if !appt.people.contains(&id) {
                        appt.people.push(id);
                    }
                }
            }
            Membership::Remove => appt.people.retain(|p| !ids.contains(p)),
        }
        let code = appt.code.clone();
        let assigned = appt.people.clone();
        self.say(format!("{code} people: {}", self.person_names(&assigned)));
        self.warn_conflicts(idx);
        Ok(())
    }

    // ── Availability rules ───────────────────────────────────

    /// Insert a rule, evicting overlapping rules of the opposite kind for the
    /// same person and date. The newest statement wins.
    pub(super) fn add_rule(
        &mut self,
        reference: &str,
        kind: RuleKind,
        date: &str,
        start_time: Option<&str>,
        duration_mins: Option<u32>,
        desc: Option<&str>,
    ) -> Outcome {
        let person_id = self
            .find_active_person_id(reference)
            .ok_or_else(|| not_found(reference.trim()))?;
        let date = check_date(date)?;
        let start_time = check_time(start_time)?;
        let duration_mins = check_duration(start_time.as_ref(), duration_mins)?;
        let timezone = self
            .state
            .person(&person_id)
            .map(|p| p.timezone.clone())
            .unwrap_or_else(|| self.state.group.timezone.clone());
        let code = next_code(
            RULE_PREFIX,
            self.state.availability_rules.iter().map(|r| r.code.as_str()),
        );
        let rule = AvailabilityRule {
            code,
            person_id,
            kind,
            date,
            start_time,
            duration_mins,
            timezone,
            desc: clamp(desc.unwrap_or_default(), MAX_RULE_DESC_LEN),
        };
        let span = bounds(&rule.timing())
            .ok_or_else(|| Rejected(format!("Cannot resolve a time for {}", rule.code)))?;

        let opposite = kind.opposite();
        let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.availability_rules)
            .into_iter()
            .partition(|r| {
                r.person_id == rule.person_id
                    && r.date == rule.date
                    && r.kind == opposite
                    && bounds(&r.timing()).is_some_and(|s| s.overlaps(&span))
            });
        self.state.availability_rules = kept;

        for old in &evicted {
            let line = format!(
                "Removed {} ({}), replaced by a newer {} rule",
                old.code,
                describe_rule(&self.state, old),
                kind.as_str()
            );
            self.say(line);
        }
        let line = format!("Added {} — {}", rule.code, describe_rule(&self.state, &rule));
        self.state.availability_rules.push(rule);
        self.say(line);
        Ok(())
    }

    pub(super) fn delete_rule(&mut self, code: &str) -> Outcome {
        let code = normalize_code(code);
        let idx = self
            .state
            .availability_rules
            .iter()
            .position(|r| r.code == code)
            .ok_or_else(|| not_found(&code))?;
        let rule = self.state.availability_rules.remove(idx);
        let line = format!("Deleted {} ({})", rule.code, describe_rule(&self.state, &rule));
        self.say(line);
        Ok(())
    }

    // ── Group ────────────────────────────────────────────────

    pub(super) fn set_identity(&mut self, reference: &str) {
        match self.find_active_person_id(reference) {
            Some(id) => {
                let name = self.state.person(&id).map(|p| p.name.clone()).unwrap_or_default();
                self.active = Some(id);
                self.say(format!("You are {name}"));
            }
            None => self.say(format!("Not found: {}", reference.trim())),
        }
    }

    pub(super) fn reset(&mut self) {
        let counts = (
            self.state.people.len(),
            self.state.appointments.len(),
            self.state.availability_rules.len(),
        );
        self.state.people.clear();
        self.state.appointments.clear();
        self.state.availability_rules.clear();
        self.active = None;
        self.say(format!(
            "Reset: removed {} people, {} appointments, {} rules",
            counts.0, counts.1, counts.2
        ));
    }
}
