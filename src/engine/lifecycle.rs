//! Ticket status graph.
//!
//! ```text
//! Pending -> Open -> In Progress -> Resolved -> Closed
//!                         ^            |           |
//!                         |            v           |
//!                         +------- Reopened <------+
//! Reopened -> Resolved
//! ```
//!
//! `Reopened` is entered only through an explicit reopen by the submitter and
//! then continues like `In Progress`.

use crate::db::TicketStatus;

/// How a transition is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Staff moving a ticket along the forward chain
    Progress,
    /// Submitter reopening a settled ticket
    Reopen,
}

/// Whether `from -> to` is legal for the given kind of request
pub fn is_legal(from: TicketStatus, to: TicketStatus, kind: TransitionKind) -> bool {
    use TicketStatus::*;

    match kind {
        TransitionKind::Progress => matches!(
            (from, to),
            (Pending, Open)
                | (Open, InProgress)
                | (InProgress, Resolved)
                | (Reopened, InProgress)
                | (Reopened, Resolved)
                | (Resolved, Closed)
        ),
        TransitionKind::Reopen => matches!((from, to), (Resolved, Reopened) | (Closed, Reopened)),
    }
}

/// Next forward states from `from`, for clients that render action buttons
pub fn next_statuses(from: TicketStatus) -> Vec<TicketStatus> {
    TicketStatus::ALL
        .into_iter()
        .filter(|to| is_legal(from, *to, TransitionKind::Progress))
        .collect()
}
