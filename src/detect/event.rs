use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Penalty,
    Deficiency,
    Star,
    Staffing,
    Qrp,
    Vbp,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Penalty => "penalty",
            Self::Deficiency => "deficiency",
            Self::Star => "star",
            Self::Staffing => "staffing",
            Self::Qrp => "qrp",
            Self::Vbp => "vbp",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering only; declaration order is the report sort order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Warn,
    Info,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Warn => 1,
            Self::Info => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Warn => "warn",
            Self::Info => "info",
        }
    }

    pub fn at_least(&self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown severity: {0}")]
pub struct SeverityParseError(pub String);

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            _ => Err(SeverityParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(kind: EventKind, severity: Severity, message: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            data,
        }
    }
}

/// Stable sort high → warn → info; emission order is kept within a tier.
pub fn sort_by_severity(events: &mut [Event]) {
    events.sort_by_key(|event| event.severity.rank());
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(kind: EventKind, severity: Severity, message: &str) -> Event {
        Event::new(kind, severity, message, Value::Null)
    }

    #[test]
    fn sorts_by_rank_and_keeps_emission_order() {
        let mut events = vec![
            event(EventKind::Star, Severity::Info, "a"),
            event(EventKind::Penalty, Severity::High, "b"),
            event(EventKind::Staffing, Severity::Warn, "c"),
            event(EventKind::Qrp, Severity::Info, "d"),
            event(EventKind::Deficiency, Severity::High, "e"),
            event(EventKind::Vbp, Severity::Warn, "f"),
        ];
        sort_by_severity(&mut events);
        let order: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(order, vec!["b", "e", "c", "f", "a", "d"]);
    }

    #[test]
    fn serializes_with_type_field() {
        let e = Event::new(
            EventKind::Deficiency,
            Severity::Warn,
            "New deficiency",
            json!({"tag": "F689"}),
        );
        let value = serde_json::to_value(&e).expect("serialize");
        assert_eq!(value["type"], "deficiency");
        assert_eq!(value["severity"], "warn");
        assert_eq!(value["data"]["tag"], "F689");
    }

    #[test]
    fn severity_threshold_comparison() {
        assert!(Severity::High.at_least(Severity::Warn));
        assert!(Severity::Warn.at_least(Severity::Warn));
        assert!(!Severity::Info.at_least(Severity::Warn));
        assert_eq!("WARNING".parse::<Severity>().expect("parse"), Severity::Warn);
    }
}
