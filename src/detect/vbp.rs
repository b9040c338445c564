use serde_json::json;

use crate::dataset::{Ccn, Table};
use crate::detect::event::{Event, EventKind, Severity};
use crate::detect::latest::select_latest_by_number;
use crate::detect::rules::meets_threshold;
use crate::detect::DiffContext;

const MULTIPLIER: &str = "incentive_payment_multiplier";
const MIN_MULTIPLIER_DELTA: f64 = 0.005;

pub fn diff_snf_vbp(
    previous: &Table,
    current: &Table,
    ccn: &Ccn,
    _ctx: &DiffContext,
) -> Vec<Event> {
    let current_rows = current.for_ccn(ccn);
    let Some(curr) = select_latest_by_number(&current_rows, "fiscal_year") else {
        return Vec::new();
    };
    let Some(new) = curr.number(MULTIPLIER) else {
        return Vec::new();
    };
    let previous_rows = previous.for_ccn(ccn);
    let old = select_latest_by_number(&previous_rows, "fiscal_year")
        .and_then(|row| row.number(MULTIPLIER));

    if let Some(old) = old {
        if !meets_threshold((new - old).abs(), MIN_MULTIPLIER_DELTA) {
            return Vec::new();
        }
    }
    let severity = match old {
        Some(old) if new < old => Severity::Warn,
        _ => Severity::Info,
    };
    let old_label = old
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "n/a".to_string());
    vec![Event::new(
        EventKind::Vbp,
        severity,
        format!("SNF VBP incentive multiplier: {old_label} → {new:.3}"),
        json!({ "from": old, "to": new, "fiscal_year": curr.number("fiscal_year") }),
    )]
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

    fn vbp(year: f64, multiplier: f64) -> Record {
        Record::new(ccn())
            .with_number("fiscal_year", year)
            .with_number(MULTIPLIER, multiplier)
    }

    #[test]
    fn decrease_is_warn_increase_is_info() {
        let down = diff_snf_vbp(
            &Table::new(vec![vbp(2024.0, 1.012)]),
            &Table::new(vec![vbp(2025.0, 0.990)]),
            &ccn(),
            &ctx(),
        );
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].severity, Severity::Warn);
        assert_eq!(down[0].message, "SNF VBP incentive multiplier: 1.012 → 0.990");

        let up = diff_snf_vbp(
            &Table::new(vec![vbp(2024.0, 0.990)]),
            &Table::new(vec![vbp(2025.0, 1.000)]),
            &ccn(),
            &ctx(),
        );
        assert_eq!(up[0].severity, Severity::Info);
    }

    #[test]
    fn threshold_boundary() {
        let at = diff_snf_vbp(
            &Table::new(vec![vbp(2024.0, 1.000)]),
            &Table::new(vec![vbp(2025.0, 1.005)]),
            &ccn(),
            &ctx(),
        );
        assert_eq!(at.len(), 1);
        let below = diff_snf_vbp(
            &Table::new(vec![vbp(2024.0, 1.000)]),
            &Table::new(vec![vbp(2025.0, 1.004)]),
            &ccn(),
            &ctx(),
        );
        assert!(below.is_empty());
    }

    #[test]
    fn uses_latest_fiscal_year_on_each_side() {
        let previous = Table::new(vec![vbp(2024.0, 1.01), vbp(2023.0, 0.95)]);
        let current = Table::new(vec![vbp(2023.0, 0.95), vbp(2024.0, 1.01)]);
        assert!(diff_snf_vbp(&previous, &current, &ccn(), &ctx()).is_empty());
    }

    #[test]
    fn newly_present_multiplier_is_info() {
        let events = diff_snf_vbp(
            &Table::default(),
            &Table::new(vec![vbp(2025.0, 1.02)]),
            &ccn(),
            &ctx(),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Info);
        assert!(events[0].message.starts_with("SNF VBP incentive multiplier: n/a"));
    }
}
