pub mod engine;
pub mod rules;
pub mod sink;

pub use engine::{dispatch_alerts, evaluate_alerts, AlertEvent};
pub use rules::AlertPolicy;
pub use sink::{sinks_from_config, AlertSink, EmailSink, StdoutSink, WebhookSink};
