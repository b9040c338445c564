use std::fmt::Write;

use crate::report::FacilityReport;

pub fn render_summary(reports: &[FacilityReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let header = &report.header;
        let _ = writeln!(
            out,
            "\n{} (CCN {}) – {}, {}",
            header.display_name(),
            header.ccn,
            header.city.as_deref().unwrap_or(""),
            header.state.as_deref().unwrap_or("")
        );
        if report.events.is_empty() {
            out.push_str("  • No notable changes in the selected window.\n");
            continue;
        }
        for event in &report.events {
            let _ = writeln!(
                out,
                "  • [{}] {}",
                event.severity.as_str().to_uppercase(),
                event.message
            );
        }
    }
    out
}
