use serde::{Deserialize, Serialize};

use crate::config::AlertsConfig;
use crate::detect::{Event, Severity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertPolicy {
    pub min_severity: Severity,
}

impl AlertPolicy {
    pub fn from_config(config: &AlertsConfig) -> Self {
        Self {
            min_severity: config.min_severity,
        }
    }

    pub fn admits(&self, event: &Event) -> bool {
        event.severity.at_least(self.min_severity)
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            min_severity: Severity::Warn,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::detect::EventKind;

    #[test]
    fn admits_at_or_above_threshold() {
        let event = |severity| Event::new(EventKind::Star, severity, "m", Value::Null);
        let policy = AlertPolicy::default();
        assert!(policy.admits(&event(Severity::High)));
        assert!(policy.admits(&event(Severity::Warn)));
        assert!(!policy.admits(&event(Severity::Info)));

        let everything = AlertPolicy {
            min_severity: Severity::Info,
        };
        assert!(everything.admits(&event(Severity::Info)));
    }
}
