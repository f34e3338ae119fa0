// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, Duration, Utc};
use common::RecurringRule;
use serde::Serialize;

/// Computes the due date of the next occurrence of a recurring task.
///
/// Returns `None` when the task has no rule or no due date; nothing to
/// schedule in either case. "monthly" is a fixed 30-day offset, not
/// calendar-month arithmetic.
pub fn next_occurrence(
    rule: Option<RecurringRule>,
    due_date: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let step = match rule? {
        RecurringRule::Daily => Duration::days(1),
        RecurringRule::Weekly => Duration::days(7),
        RecurringRule::Monthly => Duration::days(30),
    };
    Some(due_date? + step)
}

/// Outcome of completing a task through the one-way (agent tool) path.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    AlreadyCompleted,
}

/// What a complete-once call did: which task finished, and the successor
/// it spawned if a recurring rule and due date were present.
#[derive(Serialize, Debug, Clone)]
pub struct CompletionReceipt {
    pub task_id: i64,
    pub status: CompletionStatus,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_task_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<DateTime<Utc>>,
}

impl CompletionReceipt {
    pub fn already_completed(task_id: i64, title: String) -> Self {
        Self {
            task_id,
            status: CompletionStatus::AlreadyCompleted,
            title,
            next_task_id: None,
            next_due_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_advances_one_day() {
        let next = next_occurrence(Some(RecurringRule::Daily), Some(utc(2024, 1, 1)));
        assert_eq!(next, Some(utc(2024, 1, 2)));
    }

    #[test]
    fn test_weekly_advances_seven_days() {
        let next = next_occurrence(Some(RecurringRule::Weekly), Some(utc(2024, 1, 1)));
        assert_eq!(next, Some(utc(2024, 1, 8)));
    }

    #[test]
    fn test_monthly_is_thirty_days_not_calendar() {
        let next = next_occurrence(Some(RecurringRule::Monthly), Some(utc(2024, 1, 31)));
        // 30 fixed days, so this lands in March rather than on Feb 29.
        assert_eq!(next, Some(utc(2024, 3, 1)));
    }

    #[test]
    fn test_no_rule_yields_nothing() {
        assert_eq!(next_occurrence(None, Some(utc(2024, 1, 1))), None);
    }

    #[test]
    fn test_no_due_date_yields_nothing() {
        assert_eq!(next_occurrence(Some(RecurringRule::Daily), None), None);
    }

    #[test]
    fn test_receipt_serializes_without_empty_successor() {
        let receipt = CompletionReceipt::already_completed(7, "Pay rent".to_string());
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["status"], "already_completed");
        assert!(json.get("next_task_id").is_none());
        assert!(json.get("next_due_date").is_none());
    }
}
