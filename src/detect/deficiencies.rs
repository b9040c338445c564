use std::collections::BTreeSet;

use serde_json::json;

use crate::dataset::{Ccn, Table};
use crate::detect::event::{Event, EventKind, Severity};
use crate::detect::rules::{classify_scope_severity, ScopeSeverityTier};
use crate::detect::DiffContext;

const KEY_COLUMNS: [&str; 3] = ["deficiency_tag", "inspection_date", "scope_and_severity"];

pub fn diff_deficiencies(
    previous: &Table,
    current: &Table,
    ccn: &Ccn,
    _ctx: &DiffContext,
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
        let code = row
            .text("scope_and_severity")
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_default();
        let tier = classify_scope_severity(&code);
        let severity = if tier == ScopeSeverityTier::ImmediateJeopardy {
            Severity::High
        } else {
            Severity::Warn
        };
        let tag = row
            .text("deficiency_tag")
            .unwrap_or_else(|| "untagged".to_string());
        let date = row.date("inspection_date");
        let date_label = date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        events.push(Event::new(
            EventKind::Deficiency,
            severity,
            format!("New deficiency {tag} ({code}) on {date_label}"),
            json!({
                "tag": tag,
                "scope_severity": code,
                "tier": tier,
                "date": date,
            }),
        ));
    }
    events
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::dataset::Record;

    fn ccn() -> Ccn {
        "012345".parse().expect("valid ccn")
    }

    fn ctx() -> DiffContext {
        DiffContext::new(NaiveDate::from_ymd_opt(2024, 6, 1).expect("date"))
    }

    fn deficiency(tag: &str, code: &str) -> Record {
        Record::new(ccn())
            .with_text("deficiency_tag", tag)
            .with_date(
                "inspection_date",
                NaiveDate::from_ymd_opt(2024, 5, 20).expect("date"),
            )
            .with_text("scope_and_severity", code)
    }

    #[test]
    fn immediate_jeopardy_codes_are_high() {
        for code in ["J", "K", "L"] {
            let current = Table::new(vec![deficiency("F689", code)]);
            let events = diff_deficiencies(&Table::default(), &current, &ccn(), &ctx());
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].severity, Severity::High, "code {code}");
        }
    }

    #[test]
    fn other_codes_are_warn() {
        for code in ["D", "G", "I", "", "x"] {
            let current = Table::new(vec![deficiency("F880", code)]);
            let events = diff_deficiencies(&Table::default(), &current, &ccn(), &ctx());
            assert_eq!(events[0].severity, Severity::Warn, "code {code:?}");
        }
    }

    #[test]
    fn only_new_keys_are_reported() {
        let previous = Table::new(vec![deficiency("F689", "D")]);
        let current = Table::new(vec![deficiency("F689", "D"), deficiency("F880", "E")]);
        let events = diff_deficiencies(&previous, &current, &ccn(), &ctx());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "New deficiency F880 (E) on 2024-05-20");
        assert_eq!(events[0].data["tier"], "potential_harm");
    }

    #[test]
    fn scope_change_on_same_tag_counts_as_new() {
        let previous = Table::new(vec![deficiency("F689", "D")]);
        let current = Table::new(vec![deficiency("F689", "J")]);
        let events = diff_deficiencies(&previous, &current, &ccn(), &ctx());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::High);
    }
}
