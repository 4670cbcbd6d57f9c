//! User activity feed: logins, logouts, registrations, role changes and
//! page navigation by other users.

use std::sync::Arc;

use fixline_shared::{event_types, Envelope, NotificationRecord, Severity, UserActivity};
use serde_json::Value;

use super::{decode, NotificationSettings, NotificationSink, SharedSettings};
use crate::ws::{EventClient, Subscription};

pub const TITLE: &str = "User activity";

const EVENTS: [&str; 5] = [
    event_types::USER_LOGIN,
    event_types::USER_LOGOUT,
    event_types::USER_REGISTER,
    event_types::ROLE_CHANGED,
    event_types::USER_NAVIGATION,
];

pub struct UserActivityAlerts {
    sink: Arc<dyn NotificationSink>,
    settings: SharedSettings,
}

impl UserActivityAlerts {
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
        if !enabled(&self.settings.read(), &envelope.event_type) {
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
        // Some producers wrap the user under `data`.
        let payload = match payload.get("data") {
            Some(data) if data.is_object() => data,
            _ => payload,
        };
        let user: UserActivity = decode(event_type, payload)?;

        let as_role = |role: Option<&str>| {
            role.filter(|role| !role.is_empty())
                .map(|role| format!("as {}", role))
        };
        let (action, details) = match event_type {
            event_types::USER_LOGIN => ("logged in", as_role(user.role.as_deref())),
            event_types::USER_LOGOUT => ("logged out", None),
            event_types::USER_REGISTER => ("registered", as_role(user.role.as_deref())),
            event_types::ROLE_CHANGED => (
                "changed role",
                user.new_role
                    .as_deref()
                    .filter(|role| !role.is_empty())
                    .map(|role| format!("new role: {}", role)),
            ),
            _ => (
                "navigated",
                user.page_name
                    .as_deref()
                    .or(user.page.as_deref())
                    .filter(|page| !page.is_empty())
                    .map(|page| format!("to {}", page)),
            ),
        };

        let body = match details {
            Some(details) => format!("{} {} - {}", user.username, action, details),
            None => format!("{} {}", user.username, action),
        };
        Some(NotificationRecord::new(TITLE, body, Severity::Info))
    }
}

/// Role changes and navigation have no toggle of their own.
fn enabled(settings: &NotificationSettings, event_type: &str) -> bool {
    match event_type {
        event_types::USER_LOGIN => settings.show_user_logins,
        event_types::USER_LOGOUT => settings.show_user_logouts,
        event_types::USER_REGISTER => settings.show_user_registrations,
        _ => true,
    }
}
