//! Outbound notifications for the registration and review workflows.
//!
//! Delivery is fire-and-forget: workflows hand a [`Notification`] to
//! [`dispatch`] and carry on. A failed send is logged and never changes the
//! outcome of the operation that triggered it.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::Role;
use crate::engine::Department;

pub use email::SystemEmailService;

/// Message to a single recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    VerificationCode {
        to: String,
        name: String,
        code: String,
        expires_in_minutes: i64,
    },
    RoleRequestSubmitted {
        to: String,
        requester_name: String,
        requester_email: String,
        requested_role: Role,
        department: Option<Department>,
    },
    RoleRequestApproved {
        to: String,
        name: String,
        role: Role,
    },
    RoleRequestRejected {
        to: String,
        name: String,
        role: Role,
        reason: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::VerificationCode { to, .. }
            | Notification::RoleRequestSubmitted { to, .. }
            | Notification::RoleRequestApproved { to, .. }
            | Notification::RoleRequestRejected { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::VerificationCode { .. } => "verification_code",
            Notification::RoleRequestSubmitted { .. } => "role_request_submitted",
            Notification::RoleRequestApproved { .. } => "role_request_approved",
            Notification::RoleRequestRejected { .. } => "role_request_rejected",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::VerificationCode { .. } => "Your verification code".to_string(),
            Notification::RoleRequestSubmitted { requested_role, .. } => {
                format!("New {} access request awaiting review", requested_role)
            }
            Notification::RoleRequestApproved { role, .. } => {
                format!("Your {} access has been approved", role)
            }
            Notification::RoleRequestRejected { role, .. } => {
                format!("Your {} access request was declined", role)
            }
        }
    }

    /// Plain-text body
    pub fn text_body(&self) -> String {
        match self {
            Notification::VerificationCode {
                name,
                code,
                expires_in_minutes,
                ..
            } => format!(
                "Hi {},\n\nYour verification code is {}.\nIt expires in {} minutes.\n\n\
                 If you did not register, you can ignore this message.",
                name, code, expires_in_minutes
            ),
            Notification::RoleRequestSubmitted {
                requester_name,
                requester_email,
                requested_role,
                department,
                ..
            } => format!(
                "{} <{}> has requested {} access{}.\n\nReview the request in the admin console.",
                requester_name,
                requester_email,
                requested_role,
                department
                    .map(|d| format!(" for the {} department", d))
                    .unwrap_or_default()
            ),
            Notification::RoleRequestApproved { name, role, .. } => format!(
                "Hi {},\n\nYour request for {} access was approved. \
                 You can now sign in with the password you chose at registration.",
                name, role
            ),
            Notification::RoleRequestRejected {
                name, role, reason, ..
            } => format!(
                "Hi {},\n\nYour request for {} access was declined.\nReason: {}",
                name, role, reason
            ),
        }
    }
}

/// Delivery channel for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Send in the background; failures are logged only
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notification).await {
            tracing::error!(
                kind = notification.kind(),
                to = %notification.recipient(),
                error = %e,
                "Failed to deliver notification"
            );
        }
    });
}

/// Fallback used when SMTP is not configured: writes the message to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            kind = notification.kind(),
            to = %notification.recipient(),
            subject = %notification.subject(),
            body = %notification.text_body(),
            "Email not configured, logging notification"
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[test]
    fn test_subject_mentions_role() {
        let n = Notification::RoleRequestApproved {
            to: "emp@example.org".to_string(),
            name: "Meera".to_string(),
            role: Role::Employee,
        };
        assert_eq!(n.subject(), "Your employee access has been approved");
        assert_eq!(n.recipient(), "emp@example.org");
    }

    #[test]
    fn test_submitted_body_mentions_department() {
        let n = Notification::RoleRequestSubmitted {
            to: "admin@example.org".to_string(),
            requester_name: "Meera".to_string(),
            requester_email: "meera@example.org".to_string(),
            requested_role: Role::Employee,
            department: Some(Department::Sanitation),
        };
        assert!(n.text_body().contains("for the Sanitation department"));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let notifier = Arc::new(RecordingNotifier::failing());
        dispatch(
            notifier.clone(),
            Notification::VerificationCode {
                to: "a@example.org".to_string(),
                name: "A".to_string(),
                code: "123456".to_string(),
                expires_in_minutes: 10,
            },
        );
        let sent = notifier.wait_for(1).await;
        assert_eq!(sent.len(), 1);
    }
}
