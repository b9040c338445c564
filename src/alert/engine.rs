use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert::rules::AlertPolicy;
use crate::alert::sink::AlertSink;
use crate::dataset::Ccn;
use crate::detect::{Event, Severity};
use crate::report::FacilityReport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub ccn: Ccn,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub events: Vec<Event>,
    pub raised_at: DateTime<Utc>,
}

pub fn evaluate_alerts(reports: &[FacilityReport], policy: &AlertPolicy) -> Vec<AlertEvent> {
    let raised_at = Utc::now();
    reports
        .iter()
        .filter_map(|report| {
            let events: Vec<Event> = report
                .events
                .iter()
                .filter(|event| policy.admits(event))
                .cloned()
                .collect();
            // Events are already severity-sorted, so the first is the worst.
            let severity = events.first()?.severity;
            let header = &report.header;
            let title = format!(
                "{} (CCN {}): {} change{}",
                header.display_name(),
                header.ccn,
                events.len(),
                if events.len() == 1 { "" } else { "s" }
            );
            let body = events
                .iter()
                .map(|event| format!("[{}] {}", event.severity.as_str().to_uppercase(), event.message))
                .collect::<Vec<_>>()
                .join("\n");
            Some(AlertEvent {
                ccn: header.ccn.clone(),
                severity,
                title,
                body,
                events,
                raised_at,
            })
        })
        .collect()
}

/// Returns the number of successful deliveries; failures are only logged.
pub async fn dispatch_alerts(alerts: &[AlertEvent], sinks: &[Box<dyn AlertSink>]) -> usize {
    let mut delivered = 0;
    for alert in alerts {
        for sink in sinks {
            match sink.send(alert).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!("failed sending alert for {} via {}: {err:#}", alert.ccn, sink.name()),
            }
        }
    }
    info!("delivered {delivered} alert messages");
    delivered
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::detect::EventKind;
    use crate::report::FacilityHeader;

    fn report(ccn: &str, severities: &[Severity]) -> FacilityReport {
        let mut header = FacilityHeader::bare(ccn.parse().expect("valid ccn"));
        header.provider_name = Some("Maple Grove".to_string());
        FacilityReport {
            header,
            events: severities
                .iter()
                .map(|s| Event::new(EventKind::Staffing, *s, format!("{s} event"), Value::Null))
                .collect(),
        }
    }

    #[test]
    fn one_alert_per_facility_with_admitted_events() {
        let reports = vec![
            report("012345", &[Severity::High, Severity::Warn, Severity::Info]),
            report("455682", &[Severity::Info]),
            report("675791", &[]),
        ];
        let alerts = evaluate_alerts(&reports, &AlertPolicy::default());
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.ccn.as_str(), "012345");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.events.len(), 2);
        assert_eq!(alert.title, "Maple Grove (CCN 012345): 2 changes");
        assert_eq!(alert.body, "[HIGH] high event\n[WARN] warn event");
    }

    struct RecordingSink {
        fail: bool,
        seen: Mutex<Vec<Ccn>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, event: &AlertEvent) -> Result<()> {
            if self.fail {
                anyhow::bail!("sink down");
            }
            self.seen.lock().expect("lock").push(event.ccn.clone());
            Ok(())
        }
    }

    #[test]
    fn failing_sink_does_not_stop_delivery() {
        let alerts = evaluate_alerts(
            &[report("012345", &[Severity::Warn])],
            &AlertPolicy::default(),
        );
        let sinks: Vec<Box<dyn AlertSink>> = vec![
            Box::new(RecordingSink {
                fail: true,
                seen: Mutex::new(Vec::new()),
            }),
            Box::new(RecordingSink {
                fail: false,
                seen: Mutex::new(Vec::new()),
            }),
        ];
        let delivered = tokio_test::block_on(dispatch_alerts(&alerts, &sinks));
        assert_eq!(delivered, 1);
    }
}
