//! Authorization predicates, one per operation.

use serde::Serialize;

use crate::db::{Role, Ticket, User};
use crate::engine::Department;

/// Authenticated caller as resolved by the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub department: Option<Department>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role, department: Option<Department>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            department,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Employee whose department currently owns the ticket
    pub fn works_ticket(&self, ticket: &Ticket) -> bool {
        self.role == Role::Employee
            && self.department.is_some()
            && self.department == ticket.assigned_department
    }

    pub fn submitted(&self, ticket: &Ticket) -> bool {
        self.user_id == ticket.submitted_by_id
    }

    pub fn can_review_role_requests(&self) -> bool {
        self.is_admin()
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    pub fn can_assign(&self) -> bool {
        self.is_admin()
    }

    pub fn can_list_all(&self) -> bool {
        self.is_admin()
    }

    pub fn can_change_status(&self, ticket: &Ticket) -> bool {
        self.is_admin() || self.works_ticket(ticket)
    }

    pub fn can_reopen(&self, ticket: &Ticket) -> bool {
        self.submitted(ticket)
    }

    pub fn can_comment(&self, ticket: &Ticket) -> bool {
        self.is_admin() || self.submitted(ticket) || self.works_ticket(ticket)
    }

    pub fn can_view_ticket(&self, ticket: &Ticket) -> bool {
        self.can_comment(ticket)
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self::new(user.id.clone(), user.role, user.department)
    }
}
