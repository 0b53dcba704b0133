//! Registration and role-elevation workflow.
//!
//! A registration takes one of three paths:
//!
//! - citizen: held as a [`PendingUser`] until the emailed code is confirmed
//! - admin while no admin exists: created immediately (bootstrap)
//! - employee, or admin once one exists: queued as a pending [`RoleRequest`]
//!
//! Every path inserts a row into `email_claims`, whose primary key rejects a
//! second registration for the same address. The transaction writes before it
//! reads the admin count, so concurrent registrations are serialized by the
//! SQLite write lock and the count cannot go stale.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;
use std::sync::Arc;

use super::directory::{self, NewUser};
use super::error::{ServiceError, ServiceResult};
use super::validation;
use crate::config::RegistrationConfig;
use crate::crypto::{generate_otp, hash_password, hash_token, otp_matches};
use crate::db::{
    normalize_email, parse_timestamp, timestamp, ApprovalResult, DbPool, EmailHolder,
    PendingUser, RegistrationOutcome, RegistrationRequest, Role, RoleRequest, RoleRequestStats,
    RoleRequestStatus, User, UserResponse,
};
use crate::engine::{Department, Principal};
use crate::notifications::{dispatch, Notification, Notifier};

#[derive(Clone)]
pub struct RoleRequestWorkflow {
    db: DbPool,
    notifier: Arc<dyn Notifier>,
    otp_ttl: Duration,
    pending_retention: Duration,
    max_attempts: i64,
}

impl RoleRequestWorkflow {
    pub fn new(db: DbPool, notifier: Arc<dyn Notifier>, config: &RegistrationConfig) -> Self {
        Self {
            db,
            notifier,
            otp_ttl: Duration::minutes(config.otp_ttl_minutes),
            pending_retention: Duration::minutes(config.pending_retention_minutes),
            max_attempts: config.max_verification_attempts,
        }
    }

    pub async fn submit_registration(
        &self,
        request: RegistrationRequest,
    ) -> ServiceResult<RegistrationOutcome> {
        validation::validate_name(&request.name).map_err(ServiceError::Validation)?;
        validation::validate_email(&request.email).map_err(ServiceError::Validation)?;
        validation::validate_password(&request.password).map_err(ServiceError::Validation)?;

        let role = Role::from_str(&request.requested_role).map_err(ServiceError::Validation)?;
        let department = match role {
            Role::Employee => Some(parse_department(request.department.as_deref())?),
            _ => None,
        };

        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);
        let reason = validation::optional_text(request.reason);
        let password_hash = hash_password(&request.password)?;

        let now = Utc::now();
        let now_ts = timestamp(now);
        let cutoff = timestamp(now - self.pending_retention);
        let record_id = uuid::Uuid::new_v4().to_string();

        let mut tx = self.db.begin().await?;

        // An unverified registration whose code has lapsed, or that has outlived
        // retention, no longer holds the address
        sqlx::query(
            r#"DELETE FROM email_claims
               WHERE email = ? AND holder = 'pending_user'
                 AND holder_id IN (SELECT id FROM pending_users
                                   WHERE email = ? AND (otp_expires_at <= ? OR created_at < ?))"#,
        )
        .bind(&email)
        .bind(&email)
        .bind(&now_ts)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM pending_users WHERE email = ? AND (otp_expires_at <= ? OR created_at < ?)",
        )
        .bind(&email)
        .bind(&now_ts)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        if role == Role::Citizen {
            directory::claim_email(&mut *tx, &email, EmailHolder::PendingUser, &record_id, &now_ts)
                .await?;

            let code = generate_otp();
            let expires_at = timestamp(now + self.otp_ttl);
            sqlx::query(
                r#"INSERT INTO pending_users (id, name, email, password_hash, verification_otp, otp_expires_at, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&record_id)
            .bind(&name)
            .bind(&email)
            .bind(&password_hash)
            .bind(hash_token(&code))
            .bind(&expires_at)
            .bind(&now_ts)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!(email = %email, "Citizen registration awaiting verification");
            self.send_code(&email, &name, code);

            return Ok(RegistrationOutcome::NeedsVerification { email, expires_at });
        }

        directory::claim_email(&mut *tx, &email, EmailHolder::RoleRequest, &record_id, &now_ts)
            .await?;

        let (admin_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'admin'")
                .fetch_one(&mut *tx)
                .await?;

        if role == Role::Admin && admin_count == 0 {
            let user = directory::insert_user(
                &mut *tx,
                NewUser {
                    name: &name,
                    email: &email,
                    password_hash: &password_hash,
                    role: Role::Admin,
                    department: None,
                },
                &now_ts,
            )
            .await?;
            directory::transfer_claim(&mut *tx, &email, EmailHolder::User, &user.id).await?;
            tx.commit().await?;

            tracing::info!(user_id = %user.id, email = %email, "Bootstrap administrator created");
            return Ok(RegistrationOutcome::AutoApproved {
                user: UserResponse::from(user),
            });
        }

        let role_request = RoleRequest {
            id: record_id,
            requester_name: name,
            requester_email: email,
            password_hash,
            requested_role: role,
            department,
            reason,
            status: RoleRequestStatus::Pending,
            rejection_reason: None,
            created_at: now_ts,
            reviewed_at: None,
            reviewer_id: None,
            provisioned_user_id: None,
        };

        sqlx::query(
            r#"INSERT INTO role_requests
               (id, requester_name, requester_email, password_hash, requested_role, department, reason, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&role_request.id)
        .bind(&role_request.requester_name)
        .bind(&role_request.requester_email)
        .bind(&role_request.password_hash)
        .bind(role_request.requested_role)
        .bind(role_request.department)
        .bind(&role_request.reason)
        .bind(role_request.status)
        .bind(&role_request.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if super::error::is_unique_violation(&e) {
                ServiceError::DuplicateEmail
            } else {
                ServiceError::Database(e)
            }
        })?;

        tx.commit().await?;

        tracing::info!(
            request_id = %role_request.id,
            email = %role_request.requester_email,
            role = %role,
            "Role request submitted"
        );
        self.notify_admins(&role_request).await;

        Ok(RegistrationOutcome::RequiresApproval {
            request: role_request,
        })
    }

    /// Confirm a citizen registration and create the account
    pub async fn verify_registration(&self, email: &str, code: &str) -> ServiceResult<User> {
        let email = normalize_email(email);
        let pending = self
            .find_pending(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pending registration"))?;

        let expired = parse_timestamp(&pending.otp_expires_at)
            .map(|at| Utc::now() >= at)
            .unwrap_or(true);
        if expired {
            return Err(ServiceError::CodeExpired);
        }

        // Spend an attempt before comparing so parallel guesses share one allowance
        let spent = sqlx::query(
            "UPDATE pending_users SET failed_attempts = failed_attempts + 1 WHERE id = ? AND failed_attempts < ?",
        )
        .bind(&pending.id)
        .bind(self.max_attempts)
        .execute(&self.db)
        .await?;
        if spent.rows_affected() == 0 {
            tracing::warn!(email = %email, "Verification attempts exhausted");
            return Err(ServiceError::TooManyAttempts);
        }

        if !otp_matches(code, &pending.verification_otp) {
            tracing::warn!(
                email = %email,
                attempt = pending.failed_attempts + 1,
                max_attempts = self.max_attempts,
                "Incorrect verification code"
            );
            return Err(ServiceError::InvalidCode);
        }

        let now_ts = timestamp(Utc::now());
        let mut tx = self.db.begin().await?;

        let consumed = sqlx::query("DELETE FROM pending_users WHERE id = ?")
            .bind(&pending.id)
            .execute(&mut *tx)
            .await?;
        if consumed.rows_affected() == 0 {
            return Err(ServiceError::not_found("Pending registration"));
        }

        let user = directory::insert_user(
            &mut *tx,
            NewUser {
                name: &pending.name,
                email: &pending.email,
                password_hash: &pending.password_hash,
                role: Role::Citizen,
                department: None,
            },
            &now_ts,
        )
        .await?;
        directory::transfer_claim(&mut *tx, &email, EmailHolder::User, &user.id).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, email = %email, "Citizen account verified");
        Ok(user)
    }

    /// Issue a fresh code for a pending registration, returning its expiry
    pub async fn resend_verification(&self, email: &str) -> ServiceResult<String> {
        let email = normalize_email(email);
        let pending = self
            .find_pending(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pending registration"))?;

        let code = generate_otp();
        let expires_at = timestamp(Utc::now() + self.otp_ttl);

        let result = sqlx::query(
            "UPDATE pending_users SET verification_otp = ?, otp_expires_at = ?, failed_attempts = 0 WHERE id = ?",
        )
        .bind(hash_token(&code))
        .bind(&expires_at)
        .bind(&pending.id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Pending registration"));
        }

        tracing::info!(email = %email, "Verification code reissued");
        self.send_code(&email, &pending.name, code);
        Ok(expires_at)
    }

    pub async fn approve(
        &self,
        request_id: &str,
        reviewer: &Principal,
    ) -> ServiceResult<ApprovalResult> {
        if !reviewer.can_review_role_requests() {
            return Err(ServiceError::forbidden(
                "Only administrators can review role requests",
            ));
        }

        let now_ts = timestamp(Utc::now());
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE role_requests SET status = 'approved', reviewed_at = ?, reviewer_id = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(&now_ts)
        .bind(&reviewer.user_id)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.review_failure(&mut tx, request_id).await);
        }

        let mut request = sqlx::query_as::<_, RoleRequest>("SELECT * FROM role_requests WHERE id = ?")
            .bind(request_id)
            .fetch_one(&mut *tx)
            .await?;

        let user = directory::insert_user(
            &mut *tx,
            NewUser {
                name: &request.requester_name,
                email: &request.requester_email,
                password_hash: &request.password_hash,
                role: request.requested_role,
                department: request.department,
            },
            &now_ts,
        )
        .await?;

        sqlx::query("UPDATE role_requests SET provisioned_user_id = ? WHERE id = ?")
            .bind(&user.id)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        directory::transfer_claim(&mut *tx, &request.requester_email, EmailHolder::User, &user.id)
            .await?;

        tx.commit().await?;
        request.provisioned_user_id = Some(user.id.clone());

        tracing::info!(
            request_id = %request_id,
            reviewer_id = %reviewer.user_id,
            user_id = %user.id,
            role = %user.role,
            "Role request approved"
        );

        dispatch(
            self.notifier.clone(),
            Notification::RoleRequestApproved {
                to: request.requester_email.clone(),
                name: request.requester_name.clone(),
                role: request.requested_role,
            },
        );

        Ok(ApprovalResult {
            request,
            user_id: user.id,
        })
    }

    /// Close a request without provisioning an account. The address becomes free again.
    pub async fn reject(
        &self,
        request_id: &str,
        reviewer: &Principal,
        reason: &str,
    ) -> ServiceResult<RoleRequest> {
        if !reviewer.can_review_role_requests() {
            return Err(ServiceError::forbidden(
                "Only administrators can review role requests",
            ));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::MissingReason);
        }

        let now_ts = timestamp(Utc::now());
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE role_requests
               SET status = 'rejected', rejection_reason = ?, reviewed_at = ?, reviewer_id = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(reason)
        .bind(&now_ts)
        .bind(&reviewer.user_id)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.review_failure(&mut tx, request_id).await);
        }

        let request = sqlx::query_as::<_, RoleRequest>("SELECT * FROM role_requests WHERE id = ?")
            .bind(request_id)
            .fetch_one(&mut *tx)
            .await?;
        directory::release_claim(&mut *tx, &request.requester_email, EmailHolder::RoleRequest)
            .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %request_id,
            reviewer_id = %reviewer.user_id,
            "Role request rejected"
        );

        dispatch(
            self.notifier.clone(),
            Notification::RoleRequestRejected {
                to: request.requester_email.clone(),
                name: request.requester_name.clone(),
                role: request.requested_role,
                reason: reason.to_string(),
            },
        );

        Ok(request)
    }

    /// Counts by status and by requested role
    pub async fn stats(&self) -> ServiceResult<RoleRequestStats> {
        let rows: Vec<(RoleRequestStatus, Role, i64)> = sqlx::query_as(
            "SELECT status, requested_role, COUNT(*) FROM role_requests GROUP BY status, requested_role",
        )
        .fetch_all(&self.db)
        .await?;

        let mut stats = RoleRequestStats::default();
        for (status, role, count) in rows {
            stats.total += count;
            match status {
                RoleRequestStatus::Pending => stats.pending += count,
                RoleRequestStatus::Approved => stats.approved += count,
                RoleRequestStatus::Rejected => stats.rejected += count,
            }
            match role {
                Role::Employee => stats.employee += count,
                Role::Admin => stats.admin += count,
                Role::Citizen => {}
            }
        }
        Ok(stats)
    }

    /// Requests, newest first
    pub async fn list(
        &self,
        actor: &Principal,
        status: Option<RoleRequestStatus>,
    ) -> ServiceResult<Vec<RoleRequest>> {
        if !actor.can_review_role_requests() {
            return Err(ServiceError::forbidden(
                "Only administrators can view role requests",
            ));
        }

        let requests = match status {
            Some(status) => {
                sqlx::query_as::<_, RoleRequest>(
                    "SELECT * FROM role_requests WHERE status = ? ORDER BY created_at DESC, rowid DESC",
                )
                .bind(status)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, RoleRequest>(
                    "SELECT * FROM role_requests ORDER BY created_at DESC, rowid DESC",
                )
                .fetch_all(&self.db)
                .await?
            }
        };
        Ok(requests)
    }

    pub async fn get(&self, request_id: &str) -> ServiceResult<RoleRequest> {
        sqlx::query_as::<_, RoleRequest>("SELECT * FROM role_requests WHERE id = ?")
            .bind(request_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Role request"))
    }

    /// Drop unverified registrations created before the retention window.
    /// Resending a code does not extend it.
    pub async fn purge_expired_pending(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let cutoff = timestamp(now - self.pending_retention);

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"DELETE FROM email_claims
               WHERE holder = 'pending_user'
                 AND holder_id IN (SELECT id FROM pending_users WHERE created_at < ?)"#,
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM pending_users WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    async fn find_pending(&self, email: &str) -> ServiceResult<Option<PendingUser>> {
        let pending = sqlx::query_as::<_, PendingUser>("SELECT * FROM pending_users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(pending)
    }

    /// Explain why a status-guarded review update matched no row
    async fn review_failure(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        request_id: &str,
    ) -> ServiceError {
        let status: Result<Option<(RoleRequestStatus,)>, sqlx::Error> =
            sqlx::query_as("SELECT status FROM role_requests WHERE id = ?")
                .bind(request_id)
                .fetch_optional(&mut **tx)
                .await;
        match status {
            Ok(Some(_)) => ServiceError::AlreadyReviewed,
            Ok(None) => ServiceError::not_found("Role request"),
            Err(e) => ServiceError::Database(e),
        }
    }

    fn send_code(&self, email: &str, name: &str, code: String) {
        dispatch(
            self.notifier.clone(),
            Notification::VerificationCode {
                to: email.to_string(),
                name: name.to_string(),
                code,
                expires_in_minutes: self.otp_ttl.num_minutes(),
            },
        );
    }

    async fn notify_admins(&self, request: &RoleRequest) {
        let admins: Vec<(String,)> =
            match sqlx::query_as("SELECT email FROM users WHERE role = 'admin'")
                .fetch_all(&self.db)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load administrators for notification");
                    return;
                }
            };

        for (admin_email,) in admins {
            dispatch(
                self.notifier.clone(),
                Notification::RoleRequestSubmitted {
                    to: admin_email,
                    requester_name: request.requester_name.clone(),
                    requester_email: request.requester_email.clone(),
                    requested_role: request.requested_role,
                    department: request.department,
                },
            );
        }
    }
}

fn parse_department(value: Option<&str>) -> ServiceResult<Department> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(ServiceError::InvalidDepartment(
            "a department is required for employee access".to_string(),
        ));
    }
    Department::from_str(value).map_err(|_| {
        ServiceError::InvalidDepartment(format!(
            "'{}' (expected one of {})",
            value,
            Department::valid_names()
        ))
    })
}
