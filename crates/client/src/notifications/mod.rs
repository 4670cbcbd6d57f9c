//! Event consumers that turn business events into notification records.
//!
//! Consumers never touch the network. They read envelopes, call out to a
//! [`LocaleFormatter`] for dates, money and status labels, and hand the
//! result to a [`NotificationSink`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use fixline_shared::NotificationRecord;
use serde::de::DeserializeOwned;
use serde_json::Value;

mod activity;
mod inference;
mod inventory;
mod issues;
mod repair;
mod settings;
mod users;

pub use activity::IssueActivityAlerts;
pub use inference::{interpret_schedule_note, Confidence, ScheduleInference};
pub use inventory::InventoryAlerts;
pub use issues::IssueAlerts;
pub use repair::RepairNotifications;
pub use settings::{shared as shared_settings, NotificationSettings, SharedSettings};
pub use users::UserActivityAlerts;

/// Where finished notifications go (toast surface, log, test collector).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, record: NotificationRecord);
}

impl<F> NotificationSink for F
where
    F: Fn(NotificationRecord) + Send + Sync,
{
    fn notify(&self, record: NotificationRecord) {
        self(record)
    }
}

/// Locale-aware formatting supplied by the host application.
pub trait LocaleFormatter: Send + Sync {
    fn datetime(&self, at: NaiveDateTime) -> String;

    fn currency(&self, amount: f64) -> String;

    /// Display label for a schedule status such as `in_progress`.
    fn status_label(&self, status: &str) -> String {
        status.replace('_', " ")
    }
}

/// Locale-neutral formatter: ISO-like dates and a fixed currency suffix.
#[derive(Debug, Clone)]
pub struct PlainFormatter {
    pub datetime_pattern: String,
    pub currency_code: String,
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self {
            datetime_pattern: "%Y-%m-%d %H:%M".to_string(),
            currency_code: "PLN".to_string(),
        }
    }
}

impl LocaleFormatter for PlainFormatter {
    fn datetime(&self, at: NaiveDateTime) -> String {
        at.format(&self.datetime_pattern).to_string()
    }

    fn currency(&self, amount: f64) -> String {
        format!("{:.2} {}", amount, self.currency_code)
    }
}

/// Parse the date strings found in event payloads. Offsets are dropped
/// after conversion to the instant's own wall-clock time.
pub fn parse_event_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(at);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Decode an event payload, logging and dropping it when it does not fit.
fn decode<T: DeserializeOwned>(event_type: &str, payload: &Value) -> Option<T> {
    match serde_json::from_value(payload.clone()) {
        Ok(event) => Some(event),
        Err(e) => {
            crate::log_warn!("Ignoring {} with invalid payload: {}", event_type, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_payload_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parse_event_time("2025-01-15T14:30:00.000Z"), Some(expected));
        assert_eq!(parse_event_time("2025-01-15T14:30:00+01:00"), Some(expected));
        assert_eq!(parse_event_time("2025-01-15T14:30"), Some(expected));
        assert_eq!(parse_event_time("2025-01-15 14:30"), Some(expected));
        assert_eq!(
            parse_event_time("2025-01-15"),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_event_time("next tuesday"), None);
    }

    #[test]
    fn plain_formatter_output() {
        let formatter = PlainFormatter::default();
        let at = parse_event_time("2025-03-02T08:05:00Z").unwrap();
        assert_eq!(formatter.datetime(at), "2025-03-02 08:05");
        assert_eq!(formatter.currency(1234.5), "1234.50 PLN");
        assert_eq!(formatter.status_label("in_progress"), "in progress");
    }
}
