//! Ticket, comment and listing models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::Department;

/// Complaint categories accepted at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Category {
    Electrical,
    #[serde(rename = "Water Supply")]
    #[sqlx(rename = "Water Supply")]
    WaterSupply,
    Sanitation,
    Roads,
    Drainage,
    #[serde(rename = "Public Health")]
    #[sqlx(rename = "Public Health")]
    PublicHealth,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Electrical,
        Category::WaterSupply,
        Category::Sanitation,
        Category::Roads,
        Category::Drainage,
        Category::PublicHealth,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electrical => "Electrical",
            Category::WaterSupply => "Water Supply",
            Category::Sanitation => "Sanitation",
            Category::Roads => "Roads",
            Category::Drainage => "Drainage",
            Category::PublicHealth => "Public Health",
            Category::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Ticket lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum TicketStatus {
    Pending,
    Open,
    #[serde(rename = "In Progress")]
    #[sqlx(rename = "In Progress")]
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Pending,
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Reopened,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "Pending",
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
            TicketStatus::Reopened => "Reopened",
        }
    }

    /// Resolved and Closed tickets no longer count against their SLA
    pub fn is_settled(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['_', '-'], " ");
        TicketStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("Unknown ticket status: {}", s))
    }
}

/// Stored ticket record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: TicketStatus,
    pub submitted_by_id: String,
    pub assigned_department: Option<Department>,
    pub assigned_to_id: Option<String>,
    pub location: Option<String>,
    pub image_ref: Option<String>,
    pub due_date: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketComment {
    pub id: String,
    pub ticket_id: String,
    pub author_id: String,
    pub text: String,
    /// Written by the workflow itself (e.g. on reopen) rather than typed by a user
    pub is_system: bool,
    pub created_at: String,
}

/// Ticket as returned to readers, with the derived fields filled in
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub overdue: bool,
    pub suggested_department: Option<Department>,
    pub comments: Vec<TicketComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub location: Option<String>,
    pub image_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub department: String,
}

#[derive(Debug, Deserialize)]
pub struct ReopenTicketRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSort {
    #[default]
    Newest,
    Oldest,
    Priority,
    DueDate,
}

impl TicketSort {
    pub(crate) fn order_clause(&self) -> &'static str {
        match self {
            TicketSort::Newest => "created_at DESC, rowid DESC",
            TicketSort::Oldest => "created_at ASC, rowid ASC",
            TicketSort::Priority => {
                "CASE priority WHEN 'Urgent' THEN 4 WHEN 'High' THEN 3 \
                 WHEN 'Medium' THEN 2 ELSE 1 END DESC, created_at DESC, rowid DESC"
            }
            TicketSort::DueDate => "due_date ASC, rowid ASC",
        }
    }
}

/// Query parameters for ticket listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub sort: TicketSort,
    #[serde(default)]
    pub overdue_only: bool,
}

/// Parsed listing filter
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub sort: TicketSort,
    pub overdue_only: bool,
}

/// Which tickets an aggregate covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryScope {
    All,
    Submitter(String),
    Department(Department),
}

/// Aggregate counts for dashboards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketSummary {
    pub total: i64,
    pub pending: i64,
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub closed: i64,
    pub reopened: i64,
    pub overdue: i64,
}

impl TicketSummary {
    pub(crate) fn count_status(&mut self, status: TicketStatus) {
        self.total += 1;
        match status {
            TicketStatus::Pending => self.pending += 1,
            TicketStatus::Open => self.open += 1,
            TicketStatus::InProgress => self.in_progress += 1,
            TicketStatus::Resolved => self.resolved += 1,
            TicketStatus::Closed => self.closed += 1,
            TicketStatus::Reopened => self.reopened += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_accepts_common_spellings() {
        assert_eq!("In Progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert_eq!("in_progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert_eq!("resolved".parse::<TicketStatus>().unwrap(), TicketStatus::Resolved);
        assert!("done".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("water supply".parse::<Category>().unwrap(), Category::WaterSupply);
        assert_eq!("Electrical".parse::<Category>().unwrap(), Category::Electrical);
        assert!("Parking".parse::<Category>().is_err());
    }

    #[test]
    fn test_status_serializes_display_name() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
    }

    #[test]
    fn test_settled_statuses() {
        let settled: Vec<_> = TicketStatus::ALL
            .into_iter()
            .filter(|s| s.is_settled())
            .collect();
        assert_eq!(settled, vec![TicketStatus::Resolved, TicketStatus::Closed]);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = TicketSummary::default();
        summary.count_status(TicketStatus::Open);
        summary.count_status(TicketStatus::Open);
        summary.count_status(TicketStatus::Reopened);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.open, 2);
        assert_eq!(summary.reopened, 1);
    }
}
