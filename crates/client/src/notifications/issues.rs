//! Alerts for `issue_notification` events (new, updated and deleted issues).

use std::sync::Arc;

use fixline_shared::{event_types, Envelope, IssueNotification, NotificationRecord, Severity};
use serde_json::Value;

use super::{LocaleFormatter, NotificationSink};
use crate::ws::{EventClient, Subscription};

pub struct IssueAlerts {
    formatter: Arc<dyn LocaleFormatter>,
    sink: Arc<dyn NotificationSink>,
}

impl IssueAlerts {
    pub fn new(formatter: Arc<dyn LocaleFormatter>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { formatter, sink }
    }

    pub fn attach(self: &Arc<Self>, client: &EventClient) -> Subscription {
        let consumer = Arc::clone(self);
        client.on(event_types::ISSUE_NOTIFICATION, move |envelope| consumer.handle(envelope))
    }

    pub fn handle(&self, envelope: &Envelope) {
        if let Some(record) = self.derive(&envelope.payload) {
            self.sink.notify(record);
        }
    }

    pub fn derive(&self, payload: &Value) -> Option<NotificationRecord> {
        let alert: IssueNotification = match serde_json::from_value(payload.clone()) {
            Ok(alert) => alert,
            Err(e) => {
                crate::log_warn!("Ignoring issue notification with invalid payload: {}", e);
                return None;
            }
        };
        let subject = subject(alert.title.as_deref());

        let (title, body) = match alert.kind.as_str() {
            event_types::ISSUE_CREATED => {
                let reporter = alert
                    .reported_by
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("Anonymous user");
                let body = match alert.location.as_deref().filter(|loc| !loc.is_empty()) {
                    Some(location) => format!("{} reported at {} by {}", subject, location, reporter),
                    None => format!("{} reported by {}", subject, reporter),
                };
                ("New issue reported", body)
            }
            event_types::ISSUE_UPDATED => {
                let status = alert
                    .status
                    .as_deref()
                    .filter(|status| !status.is_empty())
                    .map(|status| self.formatter.status_label(status))
                    .unwrap_or_else(|| "unknown".to_string());
                ("Issue updated", format!("{} is now {}", subject, status))
            }
            event_types::ISSUE_DELETED => ("Issue deleted", format!("{} was deleted", subject)),
            other => {
                crate::log_debug!("Ignoring issue notification of kind {}", other);
                return None;
            }
        };

        Some(NotificationRecord::new(title, body, Severity::Info))
    }
}

fn subject(title: Option<&str>) -> String {
    match title.filter(|title| !title.is_empty()) {
        Some(title) => format!("\"{}\"", title),
        None => "An issue".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::PlainFormatter;
    use serde_json::json;

    fn alerts() -> IssueAlerts {
        IssueAlerts::new(Arc::new(PlainFormatter::default()), Arc::new(|_record: NotificationRecord| {}))
    }

    #[test]
    fn created_issue() {
        let record = alerts()
            .derive(&json!({
                "type": "issue_created",
                "issueId": 5,
                "title": "Freezer alarm",
                "location": "Warsaw Central",
                "reportedBy": "kasia"
            }))
            .unwrap();
        assert_eq!(record.title, "New issue reported");
        assert_eq!(record.body, "\"Freezer alarm\" reported at Warsaw Central by kasia");
        assert_eq!(record.severity, Severity::Info);
    }

    #[test]
    fn anonymous_reporter() {
        let record = alerts()
            .derive(&json!({ "type": "issue_created", "title": "Leak" }))
            .unwrap();
        assert_eq!(record.body, "\"Leak\" reported by Anonymous user");
    }

    #[test]
    fn updated_issue_with_and_without_status() {
        let record = alerts()
            .derive(&json!({ "type": "issue_updated", "title": "Leak", "status": "in_progress" }))
            .unwrap();
        assert_eq!(record.title, "Issue updated");
        assert_eq!(record.body, "\"Leak\" is now in progress");

        let record = alerts()
            .derive(&json!({ "type": "issue_updated", "title": "Leak" }))
            .unwrap();
        assert_eq!(record.body, "\"Leak\" is now unknown");
    }

    #[test]
    fn deleted_issue_without_title() {
        let record = alerts().derive(&json!({ "type": "issue_deleted" })).unwrap();
        assert_eq!(record.title, "Issue deleted");
        assert_eq!(record.body, "An issue was deleted");
    }

    #[test]
    fn unknown_or_malformed_is_ignored() {
        assert!(alerts().derive(&json!({ "type": "issue_archived" })).is_none());
        assert!(alerts().derive(&json!({ "title": "no kind" })).is_none());
        assert!(alerts().derive(&Value::Null).is_none());
    }
}
