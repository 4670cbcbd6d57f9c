//! Repair schedule notifications.
//!
//! Structured `repair_*` events are formatted directly. `issue_updated` is
//! watched as a fallback channel: a scheduled issue whose notes carry the
//! scheduling phrase still produces a "Repair scheduled" notification, with
//! defaults for whatever the note does not say.

use std::sync::Arc;

use chrono::NaiveDateTime;
use fixline_shared::{
    event_types, Envelope, IssueUpdated, NotificationRecord, RepairCompleted, RepairRescheduled,
    RepairScheduled, Severity,
};
use serde_json::Value;

use super::inference::{interpret_schedule_note, is_schedule_note, Confidence};
use super::{decode, parse_event_time, LocaleFormatter, NotificationSink};
use crate::ws::{EventClient, Subscription};

pub const TITLE_SCHEDULED: &str = "Repair scheduled";
pub const TITLE_RESCHEDULED: &str = "Repair rescheduled";
pub const TITLE_COMPLETED: &str = "Repair completed";

const DEFAULT_ACTOR: &str = "A team member";
const DEFAULT_ISSUE_TITLE: &str = "an issue";
const SCHEDULED_STATUS: &str = "scheduled";

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct RepairNotifications {
    formatter: Arc<dyn LocaleFormatter>,
    sink: Arc<dyn NotificationSink>,
    clock: Clock,
}

impl RepairNotifications {
    pub fn new(formatter: Arc<dyn LocaleFormatter>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            formatter,
            sink,
            clock: Box::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Replace the clock used when a note carries no usable date.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Subscribe to every event type this consumer reads. Dropping the
    /// returned subscriptions does not detach; call `unsubscribe` on each.
    pub fn attach(self: &Arc<Self>, client: &EventClient) -> Vec<Subscription> {
        [
            event_types::REPAIR_SCHEDULED,
            event_types::REPAIR_RESCHEDULED,
            event_types::REPAIR_COMPLETED,
            event_types::ISSUE_UPDATED,
        ]
        .into_iter()
        .map(|event_type| {
            let consumer = Arc::clone(self);
            client.on(event_type, move |envelope| consumer.handle(envelope))
        })
        .collect()
    }

    pub fn handle(&self, envelope: &Envelope) {
        if let Some(record) = self.derive(&envelope.event_type, &envelope.payload) {
            self.sink.notify(record);
        }
    }

    /// Build the notification for one event, or `None` when the event is not
    /// one this consumer reports on.
    pub fn derive(&self, event_type: &str, payload: &Value) -> Option<NotificationRecord> {
        match event_type {
            event_types::REPAIR_SCHEDULED => {
                let event: RepairScheduled = decode(event_type, payload)?;
                let when = match event.scheduled_time.as_deref().map(str::trim) {
                    Some(time) if !time.is_empty() => self.date_and_time(&event.scheduled_date, time),
                    _ => self.date(&event.scheduled_date),
                };
                Some(self.scheduled(
                    &event.scheduled_by,
                    &event.issue_title,
                    &when,
                    &event.schedule_status,
                ))
            }
            event_types::REPAIR_RESCHEDULED => {
                let event: RepairRescheduled = decode(event_type, payload)?;
                Some(NotificationRecord::new(
                    TITLE_RESCHEDULED,
                    format!(
                        "{} moved the repair for \"{}\" from {} to {} (status: {})",
                        event.scheduled_by,
                        event.issue_title,
                        self.date(&event.old_date),
                        self.date(&event.new_date),
                        self.formatter.status_label(&event.new_status)
                    ),
                    Severity::Info,
                ))
            }
            event_types::REPAIR_COMPLETED => {
                let event: RepairCompleted = decode(event_type, payload)?;
                // A zero cost means none was entered.
                let cost = match event.final_cost {
                    Some(cost) if cost != 0.0 && cost.is_finite() => self.formatter.currency(cost),
                    _ => "no cost provided".to_string(),
                };
                Some(NotificationRecord::new(
                    TITLE_COMPLETED,
                    format!(
                        "{} completed the repair for \"{}\" on {}. Final cost: {}",
                        event.completed_by,
                        event.issue_title,
                        self.date(&event.completion_date),
                        cost
                    ),
                    Severity::Success,
                ))
            }
            event_types::ISSUE_UPDATED => self.from_issue_update(payload),
            _ => None,
        }
    }

    fn from_issue_update(&self, payload: &Value) -> Option<NotificationRecord> {
        let update: IssueUpdated = serde_json::from_value(payload.clone()).unwrap_or_default();
        if update.status.as_deref() != Some(SCHEDULED_STATUS) {
            return None;
        }
        let notes = update.notes.as_deref().filter(|notes| is_schedule_note(notes))?;

        let inference = interpret_schedule_note(notes);
        if inference.confidence != Confidence::Full {
            crate::log_debug!(
                "Schedule note for issue {:?} only partially understood ({:?})",
                update.issue_id,
                inference.confidence
            );
        }

        let actor = inference.scheduled_by.as_deref().unwrap_or(DEFAULT_ACTOR);
        let when = inference.scheduled_at().unwrap_or_else(|| (self.clock)());
        let title = update
            .title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_ISSUE_TITLE);

        Some(self.scheduled(actor, title, &self.formatter.datetime(when), SCHEDULED_STATUS))
    }

    fn scheduled(&self, actor: &str, title: &str, date: &str, status: &str) -> NotificationRecord {
        NotificationRecord::new(
            TITLE_SCHEDULED,
            format!(
                "{} scheduled a repair for \"{}\" on {} (status: {})",
                actor,
                title,
                date,
                self.formatter.status_label(status)
            ),
            Severity::Info,
        )
    }

    /// Formatted date, or the raw string when it cannot be parsed.
    fn date(&self, raw: &str) -> String {
        parse_event_time(raw)
            .map(|at| self.formatter.datetime(at))
            .unwrap_or_else(|| raw.to_string())
    }

    /// A date-only value plus a separate `HH:MM`. Shown raw side by side
    /// when the pair does not parse.
    fn date_and_time(&self, date: &str, time: &str) -> String {
        let date = date.trim();
        let day = date.split('T').next().unwrap_or(date);
        parse_event_time(&format!("{}T{}", day, time))
            .map(|at| self.formatter.datetime(at))
            .unwrap_or_else(|| format!("{} {}", date, time))
    }
}
