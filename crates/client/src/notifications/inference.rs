//! Best-effort reading of scheduling details out of free-text issue notes.
//!
//! Some scheduling actions only show up as an `issue_updated` whose notes
//! look like `Scheduled for repair on 2025-01-15 at 14:30. Jan will fix it.`
//! Everything here is optional; callers decide what to default.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Marker that identifies a scheduling note.
pub const SCHEDULE_MARKER: &str = "Scheduled for repair";

static SCHEDULE_NOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Scheduled for repair on ([\d\-/]+) at ([\d:]+)\. (.*)").expect("valid regex")
});

static SCHEDULER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\w+) will fix").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Date, time and scheduler were all found.
    Full,
    /// The phrase matched but the scheduler is unknown.
    Partial,
    /// Nothing could be extracted.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInference {
    pub date: Option<String>,
    pub time: Option<String>,
    pub scheduled_by: Option<String>,
    pub details: Option<String>,
    pub confidence: Confidence,
}

impl ScheduleInference {
    fn empty() -> Self {
        Self {
            date: None,
            time: None,
            scheduled_by: None,
            details: None,
            confidence: Confidence::None,
        }
    }

    /// Date and time combined, when both parse.
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        let date = self.date.as_deref()?;
        let time = self.time.as_deref()?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y/%m/%d"))
            .or_else(|_| NaiveDate::parse_from_str(date, "%d/%m/%Y"))
            .ok()?;
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .ok()?;
        Some(date.and_time(time))
    }
}

/// Whether a note looks like a scheduling note at all.
pub fn is_schedule_note(notes: &str) -> bool {
    notes.contains(SCHEDULE_MARKER)
}

pub fn interpret_schedule_note(notes: &str) -> ScheduleInference {
    let Some(caps) = SCHEDULE_NOTE.captures(notes) else {
        return ScheduleInference::empty();
    };

    let details = caps.get(3).map(|m| m.as_str().to_string());
    let scheduled_by = details
        .as_deref()
        .and_then(|text| SCHEDULER.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let confidence = if scheduled_by.is_some() {
        Confidence::Full
    } else {
        Confidence::Partial
    };

    ScheduleInference {
        date: caps.get(1).map(|m| m.as_str().to_string()),
        time: caps.get(2).map(|m| m.as_str().to_string()),
        scheduled_by,
        details,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_note() {
        let result =
            interpret_schedule_note("Scheduled for repair on 2025-01-15 at 14:30. Jan will fix the ice machine.");
        assert_eq!(result.date.as_deref(), Some("2025-01-15"));
        assert_eq!(result.time.as_deref(), Some("14:30"));
        assert_eq!(result.scheduled_by.as_deref(), Some("Jan"));
        assert_eq!(result.details.as_deref(), Some("Jan will fix the ice machine."));
        assert_eq!(result.confidence, Confidence::Full);
        assert_eq!(
            result.scheduled_at(),
            NaiveDate::from_ymd_opt(2025, 1, 15)
                .unwrap()
                .and_hms_opt(14, 30, 0)
        );
    }

    #[test]
    fn scheduler_match_ignores_case() {
        let result = interpret_schedule_note("Scheduled for repair on 2025/02/01 at 09:00. anna WILL FIX it");
        assert_eq!(result.scheduled_by.as_deref(), Some("anna"));
        assert!(result.scheduled_at().is_some());
    }

    #[test]
    fn unknown_scheduler_is_partial() {
        let result =
            interpret_schedule_note("Scheduled for repair on 2025-01-15 at 14:30. Parts ordered.");
        assert_eq!(result.confidence, Confidence::Partial);
        assert_eq!(result.scheduled_by, None);
        assert_eq!(result.date.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn unrecognised_note_yields_nothing() {
        let result = interpret_schedule_note("Scheduled for repair soon, call facilities");
        assert_eq!(result.confidence, Confidence::None);
        assert_eq!(result.scheduled_at(), None);
        assert!(is_schedule_note("Scheduled for repair soon, call facilities"));
        assert!(!is_schedule_note("Fixed the door"));
    }

    #[test]
    fn unparsable_date_has_no_instant() {
        let result = interpret_schedule_note("Scheduled for repair on 2025-13-45 at 99:99. Jan will fix it.");
        assert_eq!(result.confidence, Confidence::Full);
        assert_eq!(result.scheduled_at(), None);
    }
}
