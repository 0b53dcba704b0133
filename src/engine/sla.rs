//! Due dates and overdue derivation.
//!
//! The due date is fixed when a ticket is created. Overdue is never stored:
//! it is recomputed from status, due date and the caller's clock on every read.

use chrono::{DateTime, Duration, Utc};

use crate::config::SlaConfig;
use crate::db::{parse_timestamp, Priority, Ticket, TicketStatus};

/// Longest resolution window accepted from configuration (ten years)
pub const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;

/// Resolution windows per priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaPolicy {
    urgent: Duration,
    high: Duration,
    medium: Duration,
    low: Duration,
}

impl SlaPolicy {
    pub fn from_config(config: &SlaConfig) -> Self {
        Self {
            urgent: window_from_hours(config.urgent_hours),
            high: window_from_hours(config.high_hours),
            medium: window_from_hours(config.medium_hours),
            low: window_from_hours(config.low_hours),
        }
    }

    pub fn window(&self, priority: Priority) -> Duration {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// `None` when the due date falls outside the representable range
    pub fn compute_due_date(
        &self,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        created_at.checked_add_signed(self.window(priority))
    }
}

fn window_from_hours(hours: i64) -> Duration {
    Duration::try_hours(hours.clamp(0, MAX_WINDOW_HOURS)).unwrap_or_else(Duration::zero)
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self::from_config(&SlaConfig::default())
    }
}

/// Whether a ticket in `status` due at `due_date` is overdue at `now`
pub fn is_overdue_at(status: TicketStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > due_date && !status.is_settled()
}

pub fn is_overdue(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    match parse_timestamp(&ticket.due_date) {
        Some(due) => is_overdue_at(ticket.status, due, now),
        None => {
            tracing::warn!(ticket_id = %ticket.id, due_date = %ticket.due_date, "Unparseable due date");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_higher_priority_gets_shorter_window() {
        let policy = SlaPolicy::default();
        let due = |p| policy.compute_due_date(p, created()).unwrap();
        let (urgent, high, medium, low) = (
            due(Priority::Urgent),
            due(Priority::High),
            due(Priority::Medium),
            due(Priority::Low),
        );
        assert!(urgent < high && high < medium && medium < low);
        assert_eq!(urgent, created() + Duration::hours(4));
    }

    #[test]
    fn test_policy_follows_config() {
        let config = SlaConfig {
            urgent_hours: 1,
            high_hours: 8,
            medium_hours: 48,
            low_hours: 240,
        };
        let policy = SlaPolicy::from_config(&config);
        assert_eq!(policy.window(Priority::High), Duration::hours(8));
        assert_eq!(policy.window(Priority::Low), Duration::hours(240));
    }

    #[test]
    fn test_oversized_windows_do_not_overflow() {
        let config = SlaConfig {
            urgent_hours: 1,
            high_hours: 8,
            medium_hours: 48,
            low_hours: 3_000_000_000,
        };
        let policy = SlaPolicy::from_config(&config);
        assert_eq!(policy.window(Priority::Low), Duration::hours(MAX_WINDOW_HOURS));
        assert!(policy.compute_due_date(Priority::Low, created()).is_some());
        assert!(policy.compute_due_date(Priority::Low, DateTime::<Utc>::MAX_UTC).is_none());
    }

    #[test]
    fn test_overdue_only_after_due_date() {
        let due = created() + Duration::hours(4);
        assert!(!is_overdue_at(TicketStatus::Open, due, due));
        assert!(is_overdue_at(TicketStatus::Open, due, due + Duration::seconds(1)));
        assert!(!is_overdue_at(TicketStatus::Open, due, created()));
    }

    #[test]
    fn test_settled_tickets_are_never_overdue() {
        let due = created();
        let later = due + Duration::days(30);
        assert!(!is_overdue_at(TicketStatus::Resolved, due, later));
        assert!(!is_overdue_at(TicketStatus::Closed, due, later));
        assert!(is_overdue_at(TicketStatus::Reopened, due, later));
        assert!(is_overdue_at(TicketStatus::Pending, due, later));
    }
}
