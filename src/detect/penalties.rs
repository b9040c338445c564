use std::collections::BTreeSet;

use serde_json::json;

use crate::dataset::{Ccn, Table};
use crate::detect::event::{Event, EventKind, Severity};
use crate::detect::rules::format_dollars;
use crate::detect::DiffContext;

const KEY_COLUMNS: [&str; 4] = [
    "imposed_date",
    "civil_money_penalty_amount",
    "dpna_start_date",
    "dpna_end_date",
];

pub fn diff_penalties(
    previous: &Table,
    current: &Table,
    ccn: &Ccn,
    ctx: &DiffContext,
) -> Vec<Event> {
    let current_rows = current.for_ccn(ccn);
    if current_rows.is_empty() {
        return Vec::new();
    }
    let previous_keys: BTreeSet<String> = previous
        .for_ccn(ccn)
        .iter()
        .map(|row| row.natural_key(&KEY_COLUMNS))
        .collect();

    let mut events = Vec::new();
    for row in current_rows {
        if previous_keys.contains(&row.natural_key(&KEY_COLUMNS)) {
            continue;
        }
        let imposed = row.date("imposed_date");

        if let Some(amount) = row
            .number("civil_money_penalty_amount")
            .filter(|amount| *amount > 0.0)
        {
            let imposed_label = imposed
                .map(|d| d.to_string())
                .unwrap_or_else(|| "date unknown".to_string());
            events.push(Event::new(
                EventKind::Penalty,
                Severity::High,
                format!(
                    "New CMP imposed: ${} (imposed {imposed_label})",
                    format_dollars(amount)
                ),
                json!({ "amount": amount, "imposed_date": imposed }),
            ));
        }

        if let Some(start) = row.date("dpna_start_date") {
            let end = row.date("dpna_end_date");
            let active = end.map(|end| end > ctx.as_of).unwrap_or(true);
            if active {
                let end_label = end
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "ongoing".to_string());
                events.push(Event::new(
                    EventKind::Penalty,
                    Severity::High,
                    format!("DPNA active or newly started ({start} → {end_label})"),
                    json!({ "dpna_start": start, "dpna_end": end }),
                ));
            }
        }
    }
    events
}
