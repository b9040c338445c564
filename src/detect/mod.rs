//! Per-dataset change rules.
//!
//! Each rule is a pure function of the previous table, the current table, a
//! facility id and a [`DiffContext`]. Rules never look at each other's output
//! and only produce events for facilities that have rows in the current table.

pub mod deficiencies;
pub mod event;
pub mod latest;
pub mod penalties;
pub mod provider;
pub mod qrp;
pub mod rules;
pub mod vbp;

use chrono::NaiveDate;

use crate::dataset::{Ccn, Dataset, Snapshot, Table};

pub use event::{sort_by_severity, Event, EventKind, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffContext {
    /// Reference date for "still active" checks.
    pub as_of: NaiveDate,
}

impl DiffContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }
}

pub type DiffRule = fn(&Table, &Table, &Ccn, &DiffContext) -> Vec<Event>;

pub const RULES: [(Dataset, DiffRule); 5] = [
    (Dataset::Penalties, penalties::diff_penalties),
    (Dataset::Deficiencies, deficiencies::diff_deficiencies),
    (Dataset::ProviderInfo, provider::diff_provider_info),
    (Dataset::SnfQrp, qrp::diff_snf_qrp),
    (Dataset::SnfVbp, vbp::diff_snf_vbp),
];

/// Without a previous snapshot no rule runs and the result is empty.
pub fn detect_changes(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    ccn: &Ccn,
    ctx: &DiffContext,
) -> Vec<Event> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for (dataset, rule) in RULES {
        events.extend(rule(previous.table(dataset), current.table(dataset), ccn, ctx));
    }
    sort_by_severity(&mut events);
    events
}
