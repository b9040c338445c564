use serde::Serialize;
use serde_json::json;

use crate::dataset::{Ccn, Table};
use crate::detect::event::{Event, EventKind, Severity};
use crate::detect::latest::select_latest;
use crate::detect::rules::{format_optional, format_value, meets_threshold};
use crate::detect::DiffContext;

pub const DATE_COLUMNS: [&str; 2] = ["reporting_period_end_date", "as_of_date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    fn is_worse(&self, old: f64, new: f64) -> bool {
        match self {
            Self::HigherIsBetter => new < old,
            Self::LowerIsBetter => new > old,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QrpMeasure {
    pub column: &'static str,
    pub label: &'static str,
    pub better: Direction,
    pub min_delta: f64,
}

pub const QRP_MEASURES: [QrpMeasure; 4] = [
    QrpMeasure {
        column: "discharge_to_community_rate",
        label: "Discharge to Community (higher is better)",
        better: Direction::HigherIsBetter,
        min_delta: 0.02,
    },
    QrpMeasure {
        column: "potentially_preventable_30_day_post_discharge_readmission_rate",
        label: "Potentially Preventable Readmissions (lower is better)",
        better: Direction::LowerIsBetter,
        min_delta: 0.02,
    },
    QrpMeasure {
        column: "mspb_pac_snf_ratio",
        label: "MSPB-PAC (lower is better)",
        better: Direction::LowerIsBetter,
        min_delta: 0.02,
    },
    QrpMeasure {
        column: "hai_hospitalization_rate",
        label: "HAI requiring hospitalization (lower is better)",
        better: Direction::LowerIsBetter,
        min_delta: 0.01,
    },
];

pub fn diff_snf_qrp(
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

    let mut events = Vec::new();
    for measure in &QRP_MEASURES {
        let Some(new) = curr.number(measure.column) else {
            continue;
        };
        let old = prev.and_then(|row| row.number(measure.column));
        if let Some(old) = old {
            if !meets_threshold((new - old).abs(), measure.min_delta) {
                continue;
            }
        }
        let (arrow, severity) = match old {
            Some(old) => {
                let arrow = if new > old { "↑" } else { "↓" };
                let severity = if measure.better.is_worse(old, new) {
                    Severity::Warn
                } else {
                    Severity::Info
                };
                (arrow, severity)
            }
            None => ("new", Severity::Info),
        };
        events.push(Event::new(
            EventKind::Qrp,
            severity,
            format!(
                "{} changed: {} → {} ({arrow})",
                measure.label,
                format_optional(old),
                format_value(new)
            ),
            json!({
                "measure": measure.column,
                "better": measure.better,
                "from": old,
                "to": new,
            }),
        ));
    }
    events
}
