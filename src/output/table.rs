use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::dataset::{Dataset, Snapshot};
use crate::detect::Severity;
use crate::history::FacilityTrend;
use crate::report::FacilityReport;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn severity_cell(severity: Severity) -> Cell {
    let label = severity.as_str().to_uppercase();
    match severity {
        Severity::High => Cell::new(label).fg(Color::Red),
        Severity::Warn => Cell::new(label).fg(Color::Yellow),
        Severity::Info => Cell::new(label),
    }
}

pub fn render_events_table(reports: &[FacilityReport]) -> String {
    let mut table = new_table();
    table.set_header(vec!["CCN", "Facility", "Location", "Severity", "Type", "Change"]);

    for report in reports {
        let header = &report.header;
        let location = match (header.city.as_deref(), header.state.as_deref()) {
            (Some(city), Some(state)) => format!("{city}, {state}"),
            (Some(only), None) | (None, Some(only)) => only.to_string(),
            (None, None) => "-".to_string(),
        };
        if report.events.is_empty() {
            table.add_row(Row::from(vec![
                Cell::new(header.ccn.as_str()),
                Cell::new(header.display_name()),
                Cell::new(&location),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("No notable changes"),
            ]));
            continue;
        }
        for event in &report.events {
            table.add_row(Row::from(vec![
                Cell::new(header.ccn.as_str()),
                Cell::new(header.display_name()),
                Cell::new(&location),
                severity_cell(event.severity),
                Cell::new(event.kind.as_str()),
                Cell::new(&event.message),
            ]));
        }
    }
    table.to_string()
}

pub fn render_trends_table(trends: &[FacilityTrend]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "CCN", "Facility", "Points", "Rating", "Current", "Avg", "Min", "Max",
    ]);
    for trend in trends {
        for rating in &trend.ratings {
            table.add_row(vec![
                trend.header.ccn.to_string(),
                trend.header.display_name().to_string(),
                trend.data_points.to_string(),
                rating.label.to_string(),
                rating
                    .current
                    .map(|v| format!("{v:.0}"))
                    .unwrap_or_else(|| "N/A".to_string()),
                format!("{:.2}", rating.mean),
                format!("{:.0}", rating.min),
                format!("{:.0}", rating.max),
            ]);
        }
    }
    table.to_string()
}

pub fn render_snapshots_table(snapshots: &[Snapshot]) -> String {
    let mut table = new_table();
    let mut header = vec!["Date".to_string()];
    header.extend(Dataset::ALL.iter().map(|ds| ds.to_string()));
    header.push("Total".to_string());
    table.set_header(header);
    for snapshot in snapshots {
        let mut row = vec![snapshot.date.to_string()];
        row.extend(snapshot.tables().map(|(_, t)| t.len().to_string()));
        row.push(snapshot.row_count().to_string());
        table.add_row(row);
    }
    table.to_string()
}
