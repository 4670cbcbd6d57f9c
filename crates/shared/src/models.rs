//! Business payloads carried inside envelopes, and the notification record
//! derived from them.

use serde::{Deserialize, Serialize};

// --- Repair schedule events ---

fn default_schedule_status() -> String {
    "scheduled".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepairScheduled {
    pub issue_id: i64,
    #[serde(alias = "title")]
    pub issue_title: String,
    pub scheduled_by: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(alias = "scheduledDateTime")]
    pub scheduled_date: String,
    /// Wall-clock `HH:MM` sent next to a date-only `scheduledDate`.
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default = "default_schedule_status")]
    pub schedule_status: String,
    #[serde(default)]
    pub technician_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepairRescheduled {
    pub issue_id: i64,
    pub issue_title: String,
    pub scheduled_by: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub old_date: String,
    pub new_date: String,
    #[serde(default)]
    pub old_status: Option<String>,
    pub new_status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepairCompleted {
    pub issue_id: i64,
    pub issue_title: String,
    pub completed_by: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub completion_date: String,
    #[serde(default)]
    pub final_cost: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// --- Issue events ---

/// Payload of `issue_updated`. The server sends the whole issue row, so
/// everything here is optional and unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdated {
    #[serde(default, alias = "id")]
    pub issue_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payload of `issue_notification`, which carries its own inner `type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueNotification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub issue_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reported_by: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Realtime issue activity: `issue_created`, `issue_updated` and
/// `issue_status_changed`. The actor field differs per event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueActivity {
    #[serde(default, alias = "id")]
    pub issue_id: Option<i64>,
    pub title: String,
    #[serde(alias = "createdBy", alias = "updatedBy", alias = "changedBy")]
    pub actor: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub updated_fields: Vec<String>,
    #[serde(default)]
    pub old_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

// --- Inventory events ---

/// Machine, location or category change. The id and actor keys are named
/// after the entity and the action (`machineId`, `removedBy`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChange {
    #[serde(default, alias = "machineId", alias = "locationId", alias = "categoryId")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(alias = "addedBy", alias = "updatedBy", alias = "removedBy")]
    pub actor: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub updated_fields: Vec<String>,
}

// --- User activity ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub old_role: Option<String>,
    #[serde(default)]
    pub new_role: Option<String>,
    #[serde(default)]
    pub changed_by: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_name: Option<String>,
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
}

/// Human-readable alert handed to the UI notification surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl NotificationRecord {
    pub fn new(title: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repair_scheduled_requires_core_fields() {
        let ok: Result<RepairScheduled, _> = serde_json::from_value(json!({
            "issueId": 4,
            "issueTitle": "Ice machine leaking",
            "scheduledBy": "Jan",
            "scheduledDate": "2025-01-15T14:30:00.000Z",
        }));
        let ok = ok.unwrap();
        assert_eq!(ok.schedule_status, "scheduled");
        assert!(ok.notes.is_none());

        let missing: Result<RepairScheduled, _> = serde_json::from_value(json!({
            "issueId": 4,
            "issueTitle": "Ice machine leaking",
        }));
        assert!(missing.is_err());
    }

    #[test]
    fn repair_scheduled_accepts_both_server_shapes() {
        let split: RepairScheduled = serde_json::from_value(json!({
            "issueId": 7,
            "title": "Ice machine",
            "location": "Bar",
            "scheduledDate": "2025-01-15",
            "scheduledTime": "14:30",
            "scheduledBy": "Jan",
            "notes": null,
            "timestamp": "2025-01-10T09:00:00.000Z",
        }))
        .unwrap();
        assert_eq!(split.issue_title, "Ice machine");
        assert_eq!(split.scheduled_time.as_deref(), Some("14:30"));
        assert_eq!(split.location.as_deref(), Some("Bar"));

        let combined: RepairScheduled = serde_json::from_value(json!({
            "issueId": 7,
            "title": "Ice machine",
            "scheduledDateTime": "2025-01-15T14:30:00.000Z",
            "technicianId": 12,
            "scheduledBy": "Jan",
        }))
        .unwrap();
        assert_eq!(combined.scheduled_date, "2025-01-15T14:30:00.000Z");
        assert_eq!(combined.technician_id, Some(12));
        assert!(combined.scheduled_time.is_none());
    }

    #[test]
    fn inventory_change_reads_entity_specific_keys() {
        let machine: InventoryChange = serde_json::from_value(json!({
            "machineId": 3,
            "name": "Fryer",
            "updatedBy": "Ola",
            "userId": 5,
            "updatedFields": ["name", "category"],
        }))
        .unwrap();
        assert_eq!(machine.id, Some(3));
        assert_eq!(machine.actor, "Ola");
        assert_eq!(machine.updated_fields, vec!["name", "category"]);

        let category: InventoryChange =
            serde_json::from_value(json!({ "categoryId": 9, "name": "Cold", "addedBy": "Jan" }))
                .unwrap();
        assert_eq!(category.id, Some(9));
        assert_eq!(category.actor, "Jan");

        let no_actor: Result<InventoryChange, _> =
            serde_json::from_value(json!({ "locationId": 1, "name": "Bar" }));
        assert!(no_actor.is_err());
    }

    #[test]
    fn issue_updated_accepts_id_alias_and_extra_fields() {
        let update: IssueUpdated = serde_json::from_value(json!({
            "id": 12,
            "title": "Fryer",
            "status": "scheduled",
            "priority": "high",
        }))
        .unwrap();
        assert_eq!(update.issue_id, Some(12));
        assert_eq!(update.status.as_deref(), Some("scheduled"));
        assert!(update.notes.is_none());
    }

    #[test]
    fn severity_is_lowercase_on_the_wire() {
        let record = NotificationRecord::new("t", "b", Severity::Success);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["severity"], "success");
    }
}
