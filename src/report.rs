use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::{Ccn, Record, Table};
use crate::detect::latest::select_latest;
use crate::detect::provider::DATE_COLUMNS;
use crate::detect::{Event, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityHeader {
    pub ccn: Ccn,
    pub provider_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl FacilityHeader {
    pub fn bare(ccn: Ccn) -> Self {
        Self {
            ccn,
            provider_name: None,
            city: None,
            state: None,
        }
    }

    pub fn from_provider_info(ccn: &Ccn, provider_info: &Table) -> Self {
        let rows = provider_info.for_ccn(ccn);
        match select_latest(&rows, &DATE_COLUMNS) {
            Some(row) => Self::from_record(ccn, row),
            None => Self::bare(ccn.clone()),
        }
    }

    pub fn from_record(ccn: &Ccn, row: &Record) -> Self {
        Self {
            ccn: ccn.clone(),
            provider_name: row.text("provider_name"),
            city: row.text("city").or_else(|| row.text("provider_city")),
            state: row.text("state").or_else(|| row.text("provider_state")),
        }
    }

    pub fn display_name(&self) -> &str {
        self.provider_name.as_deref().unwrap_or("Facility")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacilityReport {
    pub header: FacilityHeader,
    pub events: Vec<Event>,
}

impl FacilityReport {
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn count_at_least(&self, threshold: Severity) -> usize {
        self.events
            .iter()
            .filter(|event| event.severity.at_least(threshold))
            .count()
    }
}

pub fn report_path(out_dir: &Path, ccn: &Ccn) -> PathBuf {
    out_dir.join(format!("{}.json", ccn.as_str()))
}

pub fn write_report(out_dir: &Path, report: &FacilityReport) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating output dir: {}", out_dir.display()))?;
    let path = report_path(out_dir, &report.header.ccn);
    let body = serde_json::to_string_pretty(report)?;
    fs::write(&path, body).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}
