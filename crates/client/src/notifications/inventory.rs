//! Alerts for machine, location and category changes.

use std::sync::Arc;

use fixline_shared::{event_types, Envelope, InventoryChange, NotificationRecord, Severity};
use serde_json::Value;

use super::{decode, NotificationSink, SharedSettings};
use crate::ws::{EventClient, Subscription};

const EVENTS: [&str; 6] = [
    event_types::MACHINE_ADDED,
    event_types::MACHINE_UPDATED,
    event_types::MACHINE_REMOVED,
    event_types::LOCATION_ADDED,
    event_types::LOCATION_REMOVED,
    event_types::CATEGORY_ADDED,
];

pub struct InventoryAlerts {
    sink: Arc<dyn NotificationSink>,
    settings: SharedSettings,
}

impl InventoryAlerts {
    pub fn new(sink: Arc<dyn NotificationSink>, settings: SharedSettings) -> Self {
        Self { sink, settings }
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
        if !self.settings.read().show_inventory_updates {
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
        let change: InventoryChange = decode(event_type, payload)?;
        let (title, body) = match event_type {
            event_types::MACHINE_ADDED => {
                let mut body = format!("{} added machine \"{}\"", change.actor, change.name);
                if let Some(category) = present(&change.category) {
                    body.push_str(&format!(" ({})", category));
                }
                if let Some(location) = present(&change.location) {
                    body.push_str(&format!(" at {}", location));
                }
                ("Machine added", body)
            }
            event_types::MACHINE_UPDATED => {
                let mut body = format!("{} updated machine \"{}\"", change.actor, change.name);
                if !change.updated_fields.is_empty() {
                    body.push_str(&format!(": {}", change.updated_fields.join(", ")));
                }
                ("Machine updated", body)
            }
            event_types::MACHINE_REMOVED => (
                "Machine removed",
                format!("{} removed machine \"{}\"", change.actor, change.name),
            ),
            event_types::LOCATION_ADDED => (
                "Location added",
                format!("{} added location \"{}\"", change.actor, change.name),
            ),
            event_types::LOCATION_REMOVED => (
                "Location removed",
                format!("{} removed location \"{}\"", change.actor, change.name),
            ),
            _ => (
                "Category added",
                format!("{} added category \"{}\"", change.actor, change.name),
            ),
        };
        Some(NotificationRecord::new(title, body, Severity::Info))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::notifications::{shared_settings, NotificationSettings};
    use crate::ws::connection::MockConnector;
    use parking_lot::Mutex;
    use serde_json::json;

    fn alerts() -> (Arc<InventoryAlerts>, Arc<Mutex<Vec<NotificationRecord>>>, SharedSettings) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = seen.clone();
        let settings = shared_settings(NotificationSettings::default());
        let alerts = InventoryAlerts::new(
            Arc::new(move |record: NotificationRecord| collected.lock().push(record)),
            settings.clone(),
        );
        (Arc::new(alerts), seen, settings)
    }

    #[test]
    fn machine_added_with_category_and_location() {
        let (alerts, _, _) = alerts();
        let record = alerts
            .derive(
                "machine_added",
                &json!({
                    "machineId": 3,
                    "name": "Fryer 2",
                    "category": "Hot line",
                    "location": "Warsaw Central",
                    "addedBy": "Ola",
                    "userId": 5
                }),
            )
            .unwrap();
        assert_eq!(record.title, "Machine added");
        assert_eq!(record.body, "Ola added machine \"Fryer 2\" (Hot line) at Warsaw Central");
        assert_eq!(record.severity, Severity::Info);
    }

    #[test]
    fn machine_updated_lists_fields() {
        let (alerts, _, _) = alerts();
        let record = alerts
            .derive(
                "machine_updated",
                &json!({
                    "machineId": 3,
                    "name": "Fryer 2",
                    "updatedBy": "Ola",
                    "userId": 5,
                    "updatedFields": ["name", "location"]
                }),
            )
            .unwrap();
        assert_eq!(record.body, "Ola updated machine \"Fryer 2\": name, location");
    }

    #[test]
    fn removals_and_categories() {
        let (alerts, _, _) = alerts();
        let removed = alerts
            .derive("machine_removed", &json!({ "machineId": 3, "name": "Fryer 2", "removedBy": "Jan" }))
            .unwrap();
        assert_eq!(removed.title, "Machine removed");
        assert_eq!(removed.body, "Jan removed machine \"Fryer 2\"");

        let location = alerts
            .derive("location_removed", &json!({ "locationId": 2, "name": "Annex", "removedBy": "Jan" }))
            .unwrap();
        assert_eq!(location.title, "Location removed");

        let category = alerts
            .derive("category_added", &json!({ "categoryId": 9, "name": "Cold", "addedBy": "Ola" }))
            .unwrap();
        assert_eq!(category.title, "Category added");
        assert_eq!(category.body, "Ola added category \"Cold\"");
    }

    #[test]
    fn malformed_or_foreign_events_are_ignored() {
        let (alerts, _, _) = alerts();
        assert!(alerts.derive("machine_added", &json!({ "name": "Grill" })).is_none());
        assert!(alerts.derive("issue_created", &json!({ "name": "x", "addedBy": "y" })).is_none());
    }

    #[test]
    fn disabled_setting_suppresses_alerts() {
        let (alerts, seen, settings) = alerts();
        let config = ClientConfig::for_endpoint("ws://localhost:5000/ws".parse().unwrap());
        let client = EventClient::with_connector(config, Arc::new(MockConnector::new()));
        let subscriptions = alerts.attach(&client);
        assert_eq!(subscriptions.len(), 6);

        let frame = r#"{"type":"location_added","payload":{"locationId":2,"name":"Annex","addedBy":"Jan"}}"#;
        client.multiplexer().dispatch_text(frame);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].body, "Jan added location \"Annex\"");

        settings.write().show_inventory_updates = false;
        client.multiplexer().dispatch_text(frame);
        assert_eq!(seen.lock().len(), 1);

        settings.write().show_inventory_updates = true;
        client.multiplexer().dispatch_text(frame);
        assert_eq!(seen.lock().len(), 2);
    }
}
