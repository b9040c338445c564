use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::history::FacilityTrend;
use crate::report::FacilityReport;

pub fn events_to_csv(reports: &[FacilityReport]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["ccn", "provider_name", "type", "severity", "message"])?;
    for report in reports {
        for event in &report.events {
            writer.write_record([
                report.header.ccn.as_str(),
                report.header.provider_name.as_deref().unwrap_or(""),
                event.kind.as_str(),
                event.severity.as_str(),
                event.message.as_str(),
            ])?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn trends_to_csv(trends: &[FacilityTrend]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "ccn",
        "provider_name",
        "data_points",
        "rating",
        "current",
        "mean",
        "min",
        "max",
    ])?;
    for trend in trends {
        for rating in &trend.ratings {
            writer.write_record([
                trend.header.ccn.to_string(),
                trend.header.provider_name.clone().unwrap_or_default(),
                trend.data_points.to_string(),
                rating.column.to_string(),
                rating.current.map(|v| format!("{v}")).unwrap_or_default(),
                format!("{:.2}", rating.mean),
                format!("{}", rating.min),
                format!("{}", rating.max),
            ])?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn changes_csv_path(out_dir: &Path, at: DateTime<Local>) -> PathBuf {
    out_dir.join(format!("changes_{}.csv", at.format("%Y%m%d_%H%M%S")))
}

/// Writes the change export; returns `None` when there is nothing to export.
pub fn write_changes_csv(
    out_dir: &Path,
    reports: &[FacilityReport],
    at: DateTime<Local>,
) -> Result<Option<PathBuf>> {
    if reports.iter().all(|r| r.events.is_empty()) {
        return Ok(None);
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating output dir: {}", out_dir.display()))?;
    let path = changes_csv_path(out_dir, at);
    fs::write(&path, events_to_csv(reports)?)
        .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(Some(path))
}
