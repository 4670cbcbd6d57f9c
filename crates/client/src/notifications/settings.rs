//! User preferences that gate which activity notifications are shown.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Toggles read by the activity consumers right before they notify.
/// Missing keys in a stored preferences document default to shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub show_user_logins: bool,
    pub show_user_logouts: bool,
    pub show_user_registrations: bool,
    pub show_issue_updates: bool,
    pub show_inventory_updates: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            show_user_logins: true,
            show_user_logouts: true,
            show_user_registrations: true,
            show_issue_updates: true,
            show_inventory_updates: true,
        }
    }
}

/// Settings shared between the host and every consumer; edits apply to the
/// next event.
pub type SharedSettings = Arc<RwLock<NotificationSettings>>;

pub fn shared(settings: NotificationSettings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}
