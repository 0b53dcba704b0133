//! Ticket store and status workflow.
//!
//! Every mutation of a ticket goes through [`TicketStore::mutate`], which
//! loads the row, validates the change against what it loaded, and writes it
//! back with a compare-and-swap on the `version` column. A writer that loses
//! the race reloads and validates again, so a decision is never made against
//! a status that has since changed.

use chrono::{DateTime, Datelike, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;

use super::error::{ServiceError, ServiceResult};
use super::validation;
use crate::db::{
    parse_timestamp, timestamp, Category, CreateTicketRequest, DbPool, Priority, SummaryScope,
    Ticket, TicketComment, TicketFilter, TicketQuery, TicketStatus, TicketSummary, TicketView,
};
use crate::engine::lifecycle::{self, TransitionKind};
use crate::engine::sla::{is_overdue, is_overdue_at};
use crate::engine::{suggested_department, Department, Principal, SlaPolicy};

/// Attempts before a contended ticket update gives up with `Conflict`
const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct TicketStore {
    db: DbPool,
    sla: SlaPolicy,
}

/// Changes to apply to a ticket in one versioned write
#[derive(Debug, Default)]
pub(crate) struct Mutation {
    status: Option<TicketStatus>,
    department: Option<Department>,
    comment: Option<NewComment>,
}

#[derive(Debug)]
struct NewComment {
    author_id: String,
    text: String,
    is_system: bool,
}

/// Translate raw listing parameters into a typed filter
pub fn parse_filter(query: &TicketQuery) -> ServiceResult<TicketFilter> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(TicketStatus::from_str)
        .transpose()
        .map_err(ServiceError::Validation)?;
    let priority = query
        .priority
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(Priority::from_str)
        .transpose()
        .map_err(ServiceError::Validation)?;

    Ok(TicketFilter {
        status,
        priority,
        sort: query.sort,
        overdue_only: query.overdue_only,
    })
}

impl TicketStore {
    pub fn new(db: DbPool, sla: SlaPolicy) -> Self {
        Self { db, sla }
    }

    pub async fn create(
        &self,
        submitter: &Principal,
        request: CreateTicketRequest,
    ) -> ServiceResult<TicketView> {
        validation::validate_title(&request.title).map_err(ServiceError::Validation)?;
        validation::validate_description(&request.description).map_err(ServiceError::Validation)?;
        let category = Category::from_str(&request.category).map_err(ServiceError::Validation)?;
        let priority = Priority::from_str(&request.priority).map_err(ServiceError::Validation)?;

        let now = Utc::now();
        let now_ts = timestamp(now);
        let due_date = self
            .sla
            .compute_due_date(priority, now)
            .map(timestamp)
            .ok_or_else(|| {
                ServiceError::validation(format!("No representable due date for {} priority", priority))
            })?;

        let mut tx = self.db.begin().await?;

        let (seq,): (i64,) = sqlx::query_as(
            "UPDATE ticket_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
        )
        .fetch_one(&mut *tx)
        .await?;

        let ticket = Ticket {
            id: format!("GRV-{}-{:06}", now.year(), seq),
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
            category,
            priority,
            status: TicketStatus::Pending,
            submitted_by_id: submitter.user_id.clone(),
            assigned_department: None,
            assigned_to_id: None,
            location: validation::optional_text(request.location),
            image_ref: validation::optional_text(request.image_ref),
            due_date,
            created_at: now_ts.clone(),
            updated_at: now_ts,
            version: 0,
        };

        sqlx::query(
            r#"INSERT INTO tickets
               (id, title, description, category, priority, status, submitted_by_id,
                location, image_ref, due_date, created_at, updated_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)"#,
        )
        .bind(&ticket.id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.category)
        .bind(ticket.priority)
        .bind(ticket.status)
        .bind(&ticket.submitted_by_id)
        .bind(&ticket.location)
        .bind(&ticket.image_ref)
        .bind(&ticket.due_date)
        .bind(&ticket.created_at)
        .bind(&ticket.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            ticket_id = %ticket.id,
            submitter = %ticket.submitted_by_id,
            category = %ticket.category,
            priority = %ticket.priority,
            due_date = %ticket.due_date,
            "Ticket created"
        );

        Ok(self.view(ticket, Vec::new(), now))
    }

    pub async fn get(&self, ticket_id: &str, actor: &Principal) -> ServiceResult<TicketView> {
        let ticket = self.load(ticket_id).await?;
        if !actor.can_view_ticket(&ticket) {
            return Err(ServiceError::forbidden("You do not have access to this ticket"));
        }
        let comments = self.comments_for(&ticket.id).await?;
        Ok(self.view(ticket, comments, Utc::now()))
    }

    /// Move a ticket along the forward chain
    pub async fn change_status(
        &self,
        ticket_id: &str,
        actor: &Principal,
        new_status: TicketStatus,
    ) -> ServiceResult<TicketView> {
        let (before, ticket) = self
            .mutate(ticket_id, |ticket| {
                if !actor.can_change_status(ticket) {
                    return Err(ServiceError::forbidden(
                        "Only administrators or the assigned department can change this ticket's status",
                    ));
                }
                if !lifecycle::is_legal(ticket.status, new_status, TransitionKind::Progress) {
                    return Err(ServiceError::IllegalTransition {
                        from: ticket.status,
                        to: new_status,
                    });
                }
                Ok(Mutation {
                    status: Some(new_status),
                    ..Mutation::default()
                })
            })
            .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            actor = %actor.user_id,
            from = %before,
            to = %ticket.status,
            "Ticket status changed"
        );
        self.get_unchecked(ticket).await
    }

    /// Submitter sends a settled ticket back for more work
    pub async fn reopen(
        &self,
        ticket_id: &str,
        actor: &Principal,
        reason: &str,
    ) -> ServiceResult<TicketView> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::MissingReason);
        }

        let (before, ticket) = self
            .mutate(ticket_id, |ticket| {
                if !actor.can_reopen(ticket) {
                    return Err(ServiceError::forbidden(
                        "Only the submitter can reopen this ticket",
                    ));
                }
                if !lifecycle::is_legal(ticket.status, TicketStatus::Reopened, TransitionKind::Reopen)
                {
                    return Err(ServiceError::IllegalTransition {
                        from: ticket.status,
                        to: TicketStatus::Reopened,
                    });
                }
                Ok(Mutation {
                    status: Some(TicketStatus::Reopened),
                    comment: Some(NewComment {
                        author_id: actor.user_id.clone(),
                        text: format!("Ticket reopened: {}", reason),
                        is_system: true,
                    }),
                    ..Mutation::default()
                })
            })
            .await?;

        tracing::info!(ticket_id = %ticket.id, from = %before, "Ticket reopened by submitter");
        self.get_unchecked(ticket).await
    }

    pub async fn add_comment(
        &self,
        ticket_id: &str,
        actor: &Principal,
        text: &str,
    ) -> ServiceResult<TicketView> {
        validation::validate_comment(text).map_err(ServiceError::Validation)?;

        let (_, ticket) = self
            .mutate(ticket_id, |ticket| {
                if !actor.can_comment(ticket) {
                    return Err(ServiceError::forbidden(
                        "You cannot comment on this ticket",
                    ));
                }
                Ok(Mutation {
                    comment: Some(NewComment {
                        author_id: actor.user_id.clone(),
                        text: text.trim().to_string(),
                        is_system: false,
                    }),
                    ..Mutation::default()
                })
            })
            .await?;

        tracing::debug!(ticket_id = %ticket.id, author = %actor.user_id, "Comment added");
        self.get_unchecked(ticket).await
    }

    /// Route a ticket to a department. Status is left alone.
    pub async fn assign(
        &self,
        ticket_id: &str,
        actor: &Principal,
        department: &str,
    ) -> ServiceResult<TicketView> {
        if !actor.can_assign() {
            return Err(ServiceError::forbidden(
                "Only administrators can assign tickets",
            ));
        }
        let department = Department::from_str(department).map_err(|_| {
            ServiceError::InvalidDepartment(format!(
                "'{}' (expected one of {})",
                department.trim(),
                Department::valid_names()
            ))
        })?;

        let (_, ticket) = self
            .mutate(ticket_id, |_| {
                Ok(Mutation {
                    department: Some(department),
                    ..Mutation::default()
                })
            })
            .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            department = %department,
            actor = %actor.user_id,
            "Ticket assigned"
        );
        self.get_unchecked(ticket).await
    }

    pub async fn list_for_submitter(
        &self,
        user_id: &str,
        filter: &TicketFilter,
    ) -> ServiceResult<Vec<TicketView>> {
        self.list_in(&SummaryScope::Submitter(user_id.to_string()), filter, Utc::now())
            .await
    }

    pub async fn list_for_department(
        &self,
        department: Department,
        filter: &TicketFilter,
    ) -> ServiceResult<Vec<TicketView>> {
        self.list_in(&SummaryScope::Department(department), filter, Utc::now())
            .await
    }

    pub async fn list_all(
        &self,
        actor: &Principal,
        filter: &TicketFilter,
    ) -> ServiceResult<Vec<TicketView>> {
        if !actor.can_list_all() {
            return Err(ServiceError::forbidden(
                "Only administrators can list all tickets",
            ));
        }
        self.list_in(&SummaryScope::All, filter, Utc::now()).await
    }

    /// Tickets visible to the caller: own, department, or all
    pub async fn list_scoped(
        &self,
        actor: &Principal,
        filter: &TicketFilter,
    ) -> ServiceResult<Vec<TicketView>> {
        match scope_for(actor) {
            Some(scope) => self.list_in(&scope, filter, Utc::now()).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn summary(&self, scope: &SummaryScope) -> ServiceResult<TicketSummary> {
        self.summary_at(scope, Utc::now()).await
    }

    /// Summary with overdue evaluated at `now`
    pub async fn summary_at(
        &self,
        scope: &SummaryScope,
        now: DateTime<Utc>,
    ) -> ServiceResult<TicketSummary> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT status, due_date FROM tickets WHERE 1 = 1");
        push_scope(&mut qb, scope);

        let rows: Vec<(TicketStatus, String)> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut summary = TicketSummary::default();
        for (status, due_date) in rows {
            summary.count_status(status);
            if parse_timestamp(&due_date).is_some_and(|due| is_overdue_at(status, due, now)) {
                summary.overdue += 1;
            }
        }
        Ok(summary)
    }

    /// Summary for whatever the caller may list
    pub async fn summary_scoped(&self, actor: &Principal) -> ServiceResult<TicketSummary> {
        match scope_for(actor) {
            Some(scope) => self.summary(&scope).await,
            None => Ok(TicketSummary::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn load(&self, ticket_id: &str) -> ServiceResult<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket"))
    }

    async fn get_unchecked(&self, ticket: Ticket) -> ServiceResult<TicketView> {
        let comments = self.comments_for(&ticket.id).await?;
        Ok(self.view(ticket, comments, Utc::now()))
    }

    /// Load, validate with `plan`, and write back under the version check.
    ///
    /// Returns the status the change was validated against and the updated ticket.
    async fn mutate<F>(&self, ticket_id: &str, plan: F) -> ServiceResult<(TicketStatus, Ticket)>
    where
        F: Fn(&Ticket) -> ServiceResult<Mutation>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let ticket = self.load(ticket_id).await?;
            let mutation = plan(&ticket)?;
            let before = ticket.status;

            if let Some(updated) = self.apply(&ticket, mutation).await? {
                return Ok((before, updated));
            }

            tracing::debug!(
                ticket_id = %ticket_id,
                attempt,
                "Ticket changed underneath update, retrying"
            );
        }

        tracing::warn!(ticket_id = %ticket_id, "Giving up on contended ticket update");
        Err(ServiceError::Conflict(ticket_id.to_string()))
    }

    /// Write a mutation if the stored version still matches `ticket.version`.
    /// `None` means another writer got there first.
    pub(crate) async fn apply(
        &self,
        ticket: &Ticket,
        mutation: Mutation,
    ) -> ServiceResult<Option<Ticket>> {
        let now_ts = timestamp(Utc::now());
        let mut updated = ticket.clone();
        if let Some(status) = mutation.status {
            updated.status = status;
        }
        if let Some(department) = mutation.department {
            updated.assigned_department = Some(department);
        }
        updated.updated_at = now_ts.clone();
        updated.version = ticket.version + 1;

        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"UPDATE tickets SET status = ?, assigned_department = ?, updated_at = ?, version = version + 1
               WHERE id = ? AND version = ?"#,
        )
        .bind(updated.status)
        .bind(updated.assigned_department)
        .bind(&updated.updated_at)
        .bind(&ticket.id)
        .bind(ticket.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(comment) = mutation.comment {
            sqlx::query(
                r#"INSERT INTO ticket_comments (id, ticket_id, author_id, text, is_system, created_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&ticket.id)
            .bind(&comment.author_id)
            .bind(&comment.text)
            .bind(comment.is_system)
            .bind(&now_ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn comments_for(&self, ticket_id: &str) -> ServiceResult<Vec<TicketComment>> {
        let comments = sqlx::query_as::<_, TicketComment>(
            "SELECT * FROM ticket_comments WHERE ticket_id = ? ORDER BY seq ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.db)
        .await?;
        Ok(comments)
    }

    async fn list_in(
        &self,
        scope: &SummaryScope,
        filter: &TicketFilter,
        now: DateTime<Utc>,
    ) -> ServiceResult<Vec<TicketView>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tickets WHERE 1 = 1");
        push_scope(&mut qb, scope);

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority);
        }
        if filter.overdue_only {
            qb.push(" AND due_date < ")
                .push_bind(timestamp(now))
                .push(" AND status NOT IN ('Resolved', 'Closed')");
        }
        qb.push(" ORDER BY ").push(filter.sort.order_clause());

        let tickets: Vec<Ticket> = qb.build_query_as().fetch_all(&self.db).await?;
        if tickets.is_empty() {
            return Ok(Vec::new());
        }

        let mut comments = self.comments_by_ticket(&tickets).await?;
        Ok(tickets
            .into_iter()
            .map(|ticket| {
                let thread = comments.remove(&ticket.id).unwrap_or_default();
                self.view(ticket, thread, now)
            })
            .collect())
    }

    /// Comments for many tickets in one query, grouped by ticket in insertion order
    async fn comments_by_ticket(
        &self,
        tickets: &[Ticket],
    ) -> ServiceResult<HashMap<String, Vec<TicketComment>>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM ticket_comments WHERE ticket_id IN (");
        let mut ids = qb.separated(", ");
        for ticket in tickets {
            ids.push_bind(ticket.id.clone());
        }
        ids.push_unseparated(") ORDER BY seq ASC");

        let rows: Vec<TicketComment> = qb.build_query_as().fetch_all(&self.db).await?;

        let mut grouped: HashMap<String, Vec<TicketComment>> = HashMap::new();
        for comment in rows {
            grouped.entry(comment.ticket_id.clone()).or_default().push(comment);
        }
        Ok(grouped)
    }

    fn view(&self, ticket: Ticket, comments: Vec<TicketComment>, now: DateTime<Utc>) -> TicketView {
        TicketView {
            overdue: is_overdue(&ticket, now),
            suggested_department: suggested_department(ticket.category),
            ticket,
            comments,
        }
    }
}

/// Listing scope for a caller; `None` for an employee with no department
fn scope_for(actor: &Principal) -> Option<SummaryScope> {
    if actor.can_list_all() {
        return Some(SummaryScope::All);
    }
    match actor.role {
        crate::db::Role::Employee => actor.department.map(SummaryScope::Department),
        _ => Some(SummaryScope::Submitter(actor.user_id.clone())),
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: &SummaryScope) {
    match scope {
        SummaryScope::All => {}
        SummaryScope::Submitter(user_id) => {
            qb.push(" AND submitted_by_id = ").push_bind(user_id.clone());
        }
        SummaryScope::Department(department) => {
            qb.push(" AND assigned_department = ").push_bind(*department);
        }
    }
}
