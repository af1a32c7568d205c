use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, TimeZone};
use chrono_tz::Tz;

use crate::limits::*;
use crate::model::{Ms, Span, Timing};

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

pub fn parse_zone(s: &str) -> Option<Tz> {
    s.trim().parse::<Tz>().ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Resolve a local wall-clock date+time in `zone` to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are read with the offset in force before the gap, which moves
/// them forward by exactly the size of the gap.
pub fn local_to_instant(date: NaiveDate, time: NaiveTime, zone: Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::new(date, time);
    zone.from_local_datetime(&naive).earliest().or_else(|| {
        let before = zone.from_local_datetime(&(naive - Duration::days(1))).earliest()?;
        let offset = i64::from(before.offset().fix().local_minus_utc());
        Some(zone.from_utc_datetime(&(naive - Duration::seconds(offset))))
    })
}

/// Local start and end instants of a timing, or `None` if unresolvable.
///
/// All-day entries span local midnight to the next local midnight. Timed
/// entries span `[start, start + duration)` with a 60 minute default.
pub fn instants(timing: &Timing<'_>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let date = parse_date(timing.date?)?;
    let zone = parse_zone(timing.timezone)?;
    match timing.start_time {
        None => {
            let midnight = NaiveTime::from_hms_opt(0, 0, 0)?;
            let start = local_to_instant(date, midnight, zone)?;
            let end = local_to_instant(date.succ_opt()?, midnight, zone)?;
            Some((start, end))
        }
        Some(t) => {
            let start = local_to_instant(date, parse_time(t)?, zone)?;
            let mins = timing.duration_mins.unwrap_or(DEFAULT_DURATION_MINS);
            let mut end = start + Duration::minutes(i64::from(mins));
            if end.timestamp_millis() - start.timestamp_millis() < MIN_SPAN_MS {
                end = start + Duration::milliseconds(MIN_SPAN_MS);
            }
            Some((start, end))
        }
    }
}

pub fn bounds(timing: &Timing<'_>) -> Option<Span> {
    let (start, end) = instants(timing)?;
    Some(Span::new(start.timestamp_millis(), end.timestamp_millis()))
}

pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.overlaps(b)
}

/// RFC 3339 strings for the derived `start`/`end` fields.
pub fn derived_iso(timing: &Timing<'_>) -> Option<(String, String)> {
    let (start, end) = instants(timing)?;
    Some((
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

/// Recover structured fields from a legacy start/end pair.
///
/// Returns `(date, start_time, duration_mins)`; a bare date start yields an
/// all-day entry.
pub fn from_legacy(start: &str, end: Option<&str>, zone: Tz) -> Option<(String, Option<String>, Option<u32>)> {
    let start = start.trim();
    if let Some(d) = parse_date(start)
        && start.len() == 10
    {
        return Some((format_date(d), None, None));
    }
    let start_at = parse_local(start, zone)?;
    let duration = end
        .and_then(|e| parse_local(e, zone))
        .map(|e| (e.timestamp_millis() - start_at.timestamp_millis()) / 60_000)
        .filter(|m| *m > 0 && *m <= i64::from(MAX_DURATION_MINS))
        .and_then(|m| u32::try_from(m).ok());
    let local = start_at.naive_local();
    Some((format_date(local.date()), Some(format_time(local.time())), duration))
}

fn parse_local(s: &str, zone: Tz) -> Option<DateTime<Tz>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&zone));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|n| local_to_instant(n.date(), n.time(), zone))
}

pub fn span_minutes(span: &Span) -> Ms {
    span.duration_ms() / 60_000
}
