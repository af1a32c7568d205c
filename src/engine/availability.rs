use crate::model::*;

use super::interval::bounds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    NoConflict,
    Conflict,
    /// The candidate interval itself has no concrete bounds.
    Unreconcilable,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::NoConflict => "no_conflict",
            AvailabilityStatus::Conflict => "conflict",
            AvailabilityStatus::Unreconcilable => "unreconcilable",
        }
    }
}

/// A rule that overlaps the candidate interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub code: String,
    pub kind: RuleKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub status: AvailabilityStatus,
    pub reasons: Vec<RuleHit>,
}

impl Availability {
    pub fn blocking_codes(&self) -> Vec<&str> {
        self.reasons
            .iter()
            .filter(|r| r.kind == RuleKind::Unavailable)
            .map(|r| r.code.as_str())
            .collect()
    }
}

/// Classify one person against a candidate interval.
///
/// Rules with unresolvable bounds are ignored. Never mutates anything; the
/// result is advisory.
pub fn status_for_person(
    person_id: &str,
    candidate: Option<Span>,
    rules: &[AvailabilityRule],
) -> Availability {
    let Some(candidate) = candidate else {
        return Availability {
            status: AvailabilityStatus::Unreconcilable,
            reasons: Vec::new(),
        };
    };

    let reasons: Vec<RuleHit> = rules
        .iter()
        .filter(|r| r.person_id == person_id)
        .filter_map(|r| {
            let span = bounds(&r.timing())?;
            span.overlaps(&candidate).then(|| RuleHit {
                code: r.code.clone(),
                kind: r.kind,
                span,
            })
        })
        .collect();

    let status = if reasons.iter().any(|r| r.kind == RuleKind::Unavailable) {
        AvailabilityStatus::Conflict
    } else {
        AvailabilityStatus::NoConflict
    };
    Availability { status, reasons }
}

/// Status of every person assigned to an appointment, in assignment order.
pub fn classify_appointment(appt: &Appointment, rules: &[AvailabilityRule]) -> Vec<(String, Availability)> {
    let candidate = bounds(&appt.timing());
    appt.people
        .iter()
        .map(|pid| (pid.clone(), status_for_person(pid, candidate, rules)))
        .collect()
}
