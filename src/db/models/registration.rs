//! Registration, verification and role-elevation models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::user::{Role, UserResponse};
use crate::engine::Department;

/// Review state of an elevation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RoleRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RoleRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleRequestStatus::Pending => "pending",
            RoleRequestStatus::Approved => "approved",
            RoleRequestStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RoleRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoleRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RoleRequestStatus::Pending),
            "approved" => Ok(RoleRequestStatus::Approved),
            "rejected" => Ok(RoleRequestStatus::Rejected),
            _ => Err(format!("Unknown role request status: {}", s)),
        }
    }
}

/// Citizen registration awaiting email verification
#[derive(Debug, Clone, FromRow)]
pub struct PendingUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// SHA-256 hex digest of the verification code
    pub verification_otp: String,
    pub otp_expires_at: String,
    /// Verification attempts spent on the current code
    pub failed_attempts: i64,
    pub created_at: String,
}

/// Request to elevate a new account to employee or admin
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleRequest {
    pub id: String,
    pub requester_name: String,
    pub requester_email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub requested_role: Role,
    pub department: Option<Department>,
    pub reason: Option<String>,
    pub status: RoleRequestStatus,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub reviewed_at: Option<String>,
    pub reviewer_id: Option<String>,
    pub provisioned_user_id: Option<String>,
}

/// Which record currently owns an email address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EmailHolder {
    User,
    PendingUser,
    RoleRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_requested_role")]
    pub requested_role: String,
    pub department: Option<String>,
    pub reason: Option<String>,
}

fn default_requested_role() -> String {
    Role::Citizen.to_string()
}

/// Result of a registration submission
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// A verification code was sent; the account exists once it is confirmed
    NeedsVerification { email: String, expires_at: String },
    /// First administrator, created immediately
    AutoApproved { user: UserResponse },
    /// Elevation request queued for admin review
    RequiresApproval { request: RoleRequest },
}

#[derive(Debug, Deserialize)]
pub struct VerifyRegistrationRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRoleRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleRequestQuery {
    pub status: Option<String>,
}

/// Approval result: the closed request and the account it created
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub request: RoleRequest,
    pub user_id: String,
}

/// Counts of elevation requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleRequestStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub employee: i64,
    pub admin: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_defaults_to_citizen() {
        let req: RegistrationRequest = serde_json::from_str(
            r#"{"name":"Ravi","email":"ravi@example.org","password":"hunter22"}"#,
        )
        .unwrap();
        assert_eq!(req.requested_role, "citizen");
        assert!(req.department.is_none());
    }

    #[test]
    fn test_outcome_is_tagged() {
        let outcome = RegistrationOutcome::NeedsVerification {
            email: "ravi@example.org".to_string(),
            expires_at: "2026-01-01T00:10:00.000Z".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "needs_verification");
    }
}
