use serde_json::json;

use crate::dataset::{Ccn, Record, Table};
use crate::detect::event::{Event, EventKind, Severity};
use crate::detect::latest::select_latest;
use crate::detect::rules::{approx_eq, format_optional, format_value, meets_threshold};
use crate::detect::DiffContext;

pub const DATE_COLUMNS: [&str; 1] = ["month_year"];

const RATING_FIELDS: [(&str, &str); 2] = [
    ("overall_rating", "Overall star"),
    ("staffing_rating", "Staffing star"),
];

const TOTAL_HPRD: &str = "total_nurse_staffing_hours_per_resident_per_day";
const WEEKEND_HPRD: &str = "weekend_total_nurse_staff_hours_per_resident_per_day";

/// Fractional drop in total nurse HPRD that raises a warning.
const HPRD_DROP_THRESHOLD: f64 = 0.10;
/// Weekend HPRD below this share of total HPRD is reported.
const WEEKEND_RATIO_FLOOR: f64 = 0.8;
/// Turnover is published on a 0-100 scale; increases are in percentage points.
const TURNOVER_INCREASE_POINTS: f64 = 5.0;

const TURNOVER_FIELDS: [(&str, &str); 3] = [
    ("rn_turnover", "RN turnover"),
    ("total_nurse_staff_turnover", "Total nurse turnover"),
    ("administrator_turnover", "Administrator turnover"),
];

pub fn diff_provider_info(
    previous: &Table,
    current: &Table,
    ccn: &Ccn,
    _ctx: &DiffContext,
) -> Vec<Event> {
    let current_rows = current.for_ccn(ccn);
    let Some(curr) = select_latest(&current_rows, &DATE_COLUMNS) else {
        return Vec::new();
    };
    let previous_rows = previous.for_ccn(ccn);
    let prev = select_latest(&previous_rows, &DATE_COLUMNS);

    let mut events = rating_events(prev, curr);
    events.extend(hprd_drop_event(prev, curr));
    events.extend(weekend_staffing_event(prev, curr));
    events.extend(turnover_events(prev, curr));
    events
}

fn rating_events(prev: Option<&Record>, curr: &Record) -> Vec<Event> {
    let mut events = Vec::new();
    for (column, label) in RATING_FIELDS {
        let Some(new) = curr.number(column) else {
            continue;
        };
        let old = prev.and_then(|row| row.number(column));
        if old.is_some_and(|old| approx_eq(old, new)) {
            continue;
        }
        let delta = old.map(|old| new - old);
        let verb = if old.is_some() { "changed" } else { "reported" };
        let severity = match delta {
            Some(delta) if column == "overall_rating" && delta < 0.0 => Severity::Warn,
            _ => Severity::Info,
        };
        events.push(Event::new(
            EventKind::Star,
            severity,
            format!(
                "{label} {verb}: {} → {}",
                format_optional(old),
                format_value(new)
            ),
            json!({ "field": column, "from": old, "to": new }),
        ));
    }
    events
}

fn hprd_drop_event(prev: Option<&Record>, curr: &Record) -> Option<Event> {
    let old = prev?.number(TOTAL_HPRD)?;
    let new = curr.number(TOTAL_HPRD)?;
    if approx_eq(old, 0.0) {
        return None;
    }
    let change = (new - old) / old;
    if !meets_threshold(-change, HPRD_DROP_THRESHOLD) {
        return None;
    }
    Some(Event::new(
        EventKind::Staffing,
        Severity::Warn,
        format!("Total nurse HPRD fell ≥10%: {old:.2} → {new:.2}"),
        json!({ "from": old, "to": new, "pct_change": change * 100.0 }),
    ))
}

fn below_weekend_floor(row: &Record) -> Option<bool> {
    let weekend = row.number(WEEKEND_HPRD)?;
    let total = row.number(TOTAL_HPRD)?;
    Some(weekend < WEEKEND_RATIO_FLOOR * total)
}

fn weekend_staffing_event(prev: Option<&Record>, curr: &Record) -> Option<Event> {
    let prev = prev?;
    prev.number(WEEKEND_HPRD)?;
    if !below_weekend_floor(curr)? {
        return None;
    }
    if below_weekend_floor(prev) == Some(true) {
        return None;
    }
    let weekend = curr.number(WEEKEND_HPRD)?;
    let total = curr.number(TOTAL_HPRD)?;
    Some(Event::new(
        EventKind::Staffing,
        Severity::Info,
        format!(
            "Weekend staffing is low vs weekday baseline: weekend {weekend:.2} vs overall {total:.2}"
        ),
        json!({ "weekend": weekend, "overall": total }),
    ))
}

fn turnover_events(prev: Option<&Record>, curr: &Record) -> Vec<Event> {
    let Some(prev) = prev else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for (column, label) in TURNOVER_FIELDS {
        let (Some(old), Some(new)) = (prev.number(column), curr.number(column)) else {
            continue;
        };
        if !meets_threshold(new - old, TURNOVER_INCREASE_POINTS) {
            continue;
        }
        events.push(Event::new(
            EventKind::Staffing,
            Severity::Warn,
            format!("{label} increased: {old:.1}% → {new:.1}%"),
            json!({ "field": column, "from": old, "to": new, "delta_points": new - old }),
        ));
    }
    events
}
