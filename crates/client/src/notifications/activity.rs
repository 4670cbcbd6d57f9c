//! Realtime issue activity: who created, edited or moved an issue.
//!
//! The server also emits a bare `issue_updated` carrying the raw issue row
//! (no actor). Those frames belong to [`RepairNotifications`](super::RepairNotifications)
//! and are skipped here without a warning.

use std::sync::Arc;

use fixline_shared::{event_types, Envelope, IssueActivity, NotificationRecord, Severity};
use serde_json::Value;

use super::{LocaleFormatter, NotificationSink, SharedSettings};
use crate::ws::{EventClient, Subscription};

const EVENTS: [&str; 3] = [
    event_types::ISSUE_CREATED,
    event_types::ISSUE_UPDATED,
    event_types::ISSUE_STATUS_CHANGED,
];

pub struct IssueActivityAlerts {
    formatter: Arc<dyn LocaleFormatter>,
    sink: Arc<dyn NotificationSink>,
    settings: SharedSettings,
}

impl IssueActivityAlerts {
    pub fn new(
        formatter: Arc<dyn LocaleFormatter>,
        sink: Arc<dyn NotificationSink>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            formatter,
            sink,
            settings,
        }
    }

    pub fn attach(self: &Arc<Self>, client: &EventClient) -> Vec<Subscription> {
        EVENTS
            .into_iter()
            .map(|event_type| {
                let consumer = Arc::clone(self);
                client.on(event_type, move |envelope| consumer.handle(envelope))
            })
            .collect()
    }

    pub fn handle(&self, envelope: &Envelope) {
        if !self.settings.read().show_issue_updates {
            return;
        }
        if let Some(record) = self.derive(&envelope.event_type, &envelope.payload) {
            self.sink.notify(record);
        }
    }

    pub fn derive(&self, event_type: &str, payload: &Value) -> Option<NotificationRecord> {
        if !EVENTS.contains(&event_type) {
            return None;
        }
        let activity: IssueActivity = match serde_json::from_value(payload.clone()) {
            Ok(activity) => activity,
            Err(e) => {
                crate::log_debug!("No issue activity in {}: {}", event_type, e);
                return None;
            }
        };

        let (title, body) = match event_type {
            event_types::ISSUE_CREATED => {
                let body = match activity.location.as_deref().filter(|loc| !loc.is_empty()) {
                    Some(location) => format!(
                        "{} reported \"{}\" at {}",
                        activity.actor, activity.title, location
                    ),
                    None => format!("{} reported \"{}\"", activity.actor, activity.title),
                };
                ("Issue created", body)
            }
            event_types::ISSUE_UPDATED => {
                let mut body = format!("{} updated \"{}\"", activity.actor, activity.title);
                if !activity.updated_fields.is_empty() {
                    body.push_str(&format!(": {}", activity.updated_fields.join(", ")));
                }
                ("Issue updated", body)
            }
            _ => {
                let label = |status: Option<&str>| {
                    status
                        .filter(|status| !status.is_empty())
                        .map(|status| self.formatter.status_label(status))
                        .unwrap_or_else(|| "unknown".to_string())
                };
                (
                    "Issue status changed",
                    format!(
                        "{} changed \"{}\" from {} to {}",
                        activity.actor,
                        activity.title,
                        label(activity.old_status.as_deref()),
                        label(activity.new_status.as_deref())
                    ),
                )
            }
        };
        Some(NotificationRecord::new(title, body, Severity::Info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::notifications::{shared_settings, NotificationSettings, PlainFormatter};
    use crate::ws::connection::MockConnector;
    use parking_lot::Mutex;
    use serde_json::json;

    fn alerts(settings: SharedSettings) -> (Arc<IssueActivityAlerts>, Arc<Mutex<Vec<NotificationRecord>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = seen.clone();
        let alerts = IssueActivityAlerts::new(
            Arc::new(PlainFormatter::default()),
            Arc::new(move |record: NotificationRecord| collected.lock().push(record)),
            settings,
        );
        (Arc::new(alerts), seen)
    }

    fn defaults() -> Arc<IssueActivityAlerts> {
        alerts(shared_settings(NotificationSettings::default())).0
    }

    #[test]
    fn created_with_location() {
        let record = defaults()
            .derive(
                "issue_created",
                &json!({
                    "issueId": 5,
                    "title": "Freezer alarm",
                    "createdBy": "kasia",
                    "userId": 2,
                    "location": "Warsaw Central"
                }),
            )
            .unwrap();
        assert_eq!(record.title, "Issue created");
        assert_eq!(record.body, "kasia reported \"Freezer alarm\" at Warsaw Central");
    }

    #[test]
    fn updated_lists_fields() {
        let record = defaults()
            .derive(
                "issue_updated",
                &json!({
                    "issueId": 5,
                    "title": "Freezer alarm",
                    "updatedBy": "Ola",
                    "updatedFields": ["priority", "notes"]
                }),
            )
            .unwrap();
        assert_eq!(record.body, "Ola updated \"Freezer alarm\": priority, notes");
    }

    #[test]
    fn status_change_uses_status_labels() {
        let record = defaults()
            .derive(
                "issue_status_changed",
                &json!({
                    "issueId": 5,
                    "title": "Freezer alarm",
                    "changedBy": "Piotr",
                    "oldStatus": "pending",
                    "newStatus": "in_progress"
                }),
            )
            .unwrap();
        assert_eq!(record.title, "Issue status changed");
        assert_eq!(record.body, "Piotr changed \"Freezer alarm\" from pending to in progress");
    }

    #[test]
    fn raw_issue_rows_are_skipped() {
        assert!(defaults()
            .derive(
                "issue_updated",
                &json!({ "id": 7, "title": "Ice machine", "status": "scheduled", "notes": "Scheduled for repair" }),
            )
            .is_none());
        assert!(defaults().derive("machine_added", &json!({})).is_none());
    }

    #[test]
    fn disabled_setting_suppresses_alerts() {
        let settings = shared_settings(NotificationSettings {
            show_issue_updates: false,
            ..NotificationSettings::default()
        });
        let (alerts, seen) = alerts(settings.clone());
        let config = ClientConfig::for_endpoint("ws://localhost:5000/ws".parse().unwrap());
        let client = EventClient::with_connector(config, Arc::new(MockConnector::new()));
        let _subscriptions = alerts.attach(&client);

        let frame = r#"{"type":"issue_created","payload":{"issueId":1,"title":"Leak","createdBy":"Jan"}}"#;
        client.multiplexer().dispatch_text(frame);
        assert!(seen.lock().is_empty());

        settings.write().show_issue_updates = true;
        client.multiplexer().dispatch_text(frame);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].body, "Jan reported \"Leak\"");
    }
}
