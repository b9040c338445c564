//! Rating trends across stored snapshots.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::dataset::{Ccn, Dataset, Record, Snapshot};
use crate::detect::latest::select_latest;
use crate::detect::provider::DATE_COLUMNS;
use crate::report::FacilityHeader;
use crate::snapshot::SnapshotStore;

pub const TREND_RATINGS: [(&str, &str); 4] = [
    ("overall_rating", "Overall"),
    ("staffing_rating", "Staffing"),
    ("quality_measures_rating", "Quality Measures"),
    ("health_inspection_rating", "Health Inspection"),
];

const DAYS_PER_MONTH: u64 = 30;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RatingTrend {
    pub column: &'static str,
    pub label: &'static str,
    /// Value in the most recent snapshot, if it reported one.
    pub current: Option<f64>,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FacilityTrend {
    pub header: FacilityHeader,
    pub data_points: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub ratings: Vec<RatingTrend>,
}

pub fn history_cutoff(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(months) * DAYS_PER_MONTH))
        .unwrap_or(NaiveDate::MIN)
}

pub fn load_since(store: &dyn SnapshotStore, since: NaiveDate) -> Result<Vec<Snapshot>> {
    store
        .list_dates()?
        .into_iter()
        .filter(|date| *date >= since)
        .map(|date| {
            store
                .load(date)
                .with_context(|| format!("failed loading snapshot {date}"))
        })
        .collect()
}

/// Per-facility rating summary; facilities with no provider rows are omitted.
pub fn summarize_trends(snapshots: &[Snapshot], ccns: &[Ccn]) -> Vec<FacilityTrend> {
    ccns.iter()
        .filter_map(|ccn| summarize_facility(snapshots, ccn))
        .collect()
}

fn summarize_facility(snapshots: &[Snapshot], ccn: &Ccn) -> Option<FacilityTrend> {
    let points: Vec<(NaiveDate, &Record)> = snapshots
        .iter()
        .filter_map(|snapshot| {
            let rows = snapshot.table(Dataset::ProviderInfo).for_ccn(ccn);
            select_latest(&rows, &DATE_COLUMNS).map(|row| (snapshot.date, row))
        })
        .collect();
    let (first_date, _) = *points.first()?;
    let (last_date, latest) = *points.last()?;

    let ratings = TREND_RATINGS
        .iter()
        .filter_map(|&(column, label)| {
            let values: Vec<f64> = points.iter().filter_map(|(_, row)| row.number(column)).collect();
            if values.is_empty() {
                return None;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some(RatingTrend {
                column,
                label,
                current: latest.number(column),
                mean,
                min,
                max,
            })
        })
        .collect();

    Some(FacilityTrend {
        header: FacilityHeader::from_record(ccn, latest),
        data_points: points.len(),
        first_date,
        last_date,
        ratings,
    })
}
