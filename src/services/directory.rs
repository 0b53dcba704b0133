//! Identity directory: user records, email claims and sessions.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use super::error::{is_unique_violation, ServiceError, ServiceResult};
use super::validation;
use crate::config::AuthConfig;
use crate::crypto::{generate_token, hash_token, verify_password};
use crate::db::{
    normalize_email, now_timestamp, timestamp, DbPool, EmailHolder, LoginResponse, Role,
    UserResponse, User,
};
use crate::engine::{Department, Principal};

#[derive(Clone)]
pub struct Directory {
    db: DbPool,
    session_ttl: Duration,
}

/// Fields for a user row about to be created
pub(crate) struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub department: Option<Department>,
}

impl Directory {
    pub fn new(db: DbPool, auth: &AuthConfig) -> Self {
        Self {
            db,
            session_ttl: Duration::hours(auth.session_ttl_hours),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> ServiceResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    /// Case-insensitive lookup
    pub async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    pub async fn principal(&self, user_id: &str) -> ServiceResult<Principal> {
        let user = self.get(user_id).await?;
        Ok(Principal::from(&user))
    }

    pub async fn count_by_role(&self, role: Role) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Evaluated against the table on every call
    pub async fn admin_exists(&self) -> ServiceResult<bool> {
        Ok(self.count_by_role(Role::Admin).await? > 0)
    }

    pub async fn update_profile(&self, user_id: &str, name: &str) -> ServiceResult<User> {
        validation::validate_name(name).map_err(ServiceError::Validation)?;

        let result = sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name.trim())
            .bind(now_timestamp())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("User"));
        }

        tracing::info!(user_id = %user_id, "Profile updated");
        self.get(user_id).await
    }

    /// All accounts, optionally restricted to one role; admin only
    pub async fn list_users(&self, actor: &Principal, role: Option<Role>) -> ServiceResult<Vec<User>> {
        if !actor.can_manage_users() {
            return Err(ServiceError::forbidden("Only administrators can list users"));
        }

        let users = match role {
            Some(role) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE role = ? ORDER BY created_at ASC, rowid ASC",
                )
                .bind(role)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC, rowid ASC")
                    .fetch_all(&self.db)
                    .await?
            }
        };
        Ok(users)
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Check credentials and open a session
    pub async fn login(&self, email: &str, password: &str) -> ServiceResult<LoginResponse> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            tracing::warn!(user_id = %user.id, "Failed login attempt");
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self.create_session(&user.id).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

        Ok(LoginResponse {
            token,
            user: UserResponse::from(user),
        })
    }

    /// Issue a session token; only its digest is stored
    pub async fn create_session(&self, user_id: &str) -> ServiceResult<String> {
        let token = generate_token();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(timestamp(now + self.session_ttl))
        .bind(timestamp(now))
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    /// User owning a live session token
    pub async fn resolve_session(&self, token: &str) -> ServiceResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT users.* FROM sessions
               JOIN users ON users.id = sessions.user_id
               WHERE sessions.token_hash = ? AND sessions.expires_at > ?"#,
        )
        .bind(hash_token(token))
        .bind(now_timestamp())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    pub async fn revoke_session(&self, token: &str) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(timestamp(now))
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

// -----------------------------------------------------------------------------
// Transaction helpers shared by the registration workflow
// -----------------------------------------------------------------------------

pub(crate) async fn insert_user(
    conn: &mut SqliteConnection,
    new: NewUser<'_>,
    now: &str,
) -> ServiceResult<User> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: new.name.trim().to_string(),
        email: normalize_email(new.email),
        password_hash: new.password_hash.to_string(),
        role: new.role,
        department: new.department,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    };

    sqlx::query(
        r#"INSERT INTO users (id, name, email, password_hash, role, department, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.department)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ServiceError::DuplicateEmail
        } else {
            ServiceError::Database(e)
        }
    })?;

    Ok(user)
}

/// Reserve an address. A second claim on the same address fails with `DuplicateEmail`.
pub(crate) async fn claim_email(
    conn: &mut SqliteConnection,
    email: &str,
    holder: EmailHolder,
    holder_id: &str,
    now: &str,
) -> ServiceResult<()> {
    sqlx::query("INSERT INTO email_claims (email, holder, holder_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(email)
        .bind(holder)
        .bind(holder_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::DuplicateEmail
            } else {
                ServiceError::Database(e)
            }
        })?;
    Ok(())
}

/// Hand an existing claim to a new holder record
pub(crate) async fn transfer_claim(
    conn: &mut SqliteConnection,
    email: &str,
    holder: EmailHolder,
    holder_id: &str,
) -> ServiceResult<()> {
    sqlx::query("UPDATE email_claims SET holder = ?, holder_id = ? WHERE email = ?")
        .bind(holder)
        .bind(holder_id)
        .bind(email)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn release_claim(
    conn: &mut SqliteConnection,
    email: &str,
    holder: EmailHolder,
) -> ServiceResult<()> {
    sqlx::query("DELETE FROM email_claims WHERE email = ? AND holder = ?")
        .bind(email)
        .bind(holder)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::OnceLock;

    pub const TEST_PASSWORD: &str = "streetlight42";

    /// Argon2 is slow in debug builds, so every seeded account shares one hash
    pub fn test_password_hash() -> &'static str {
        static HASH: OnceLock<String> = OnceLock::new();
        HASH.get_or_init(|| crate::crypto::hash_password(TEST_PASSWORD).unwrap())
    }

    /// Create an account directly, claiming its email
    pub async fn seed_user(
        db: &DbPool,
        name: &str,
        email: &str,
        role: Role,
        department: Option<Department>,
    ) -> User {
        let now = now_timestamp();
        let mut tx = db.begin().await.unwrap();
        let user = insert_user(
            &mut *tx,
            NewUser {
                name,
                email,
                password_hash: test_password_hash(),
                role,
                department,
            },
            &now,
        )
        .await
        .unwrap();
        claim_email(&mut *tx, &user.email, EmailHolder::User, &user.id, &now)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user
    }
}
