use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    AddCommentRequest, AssignTicketRequest, ChangeStatusRequest, CreateTicketRequest,
    ReopenTicketRequest, TicketQuery, TicketStatus, TicketSummary, TicketView,
};
use crate::engine::{lifecycle, Principal};
use crate::services::tickets::parse_filter;
use crate::AppState;

/// Actions the caller can take on a ticket right now
#[derive(Debug, Serialize)]
pub struct TicketActions {
    pub status: TicketStatus,
    pub next_statuses: Vec<TicketStatus>,
    pub can_reopen: bool,
    pub can_comment: bool,
    pub can_assign: bool,
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketView>), ApiError> {
    let ticket = state.tickets.create(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Citizens see their own tickets, employees their department's, admins everything
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    let filter = parse_filter(&query)?;
    let tickets = state.tickets.list_scoped(&principal, &filter).await?;
    Ok(Json(tickets))
}

pub async fn ticket_summary(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<TicketSummary>, ApiError> {
    let summary = state.tickets.summary_scoped(&principal).await?;
    Ok(Json(summary))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, ApiError> {
    let ticket = state.tickets.get(&id, &principal).await?;
    Ok(Json(ticket))
}

pub async fn ticket_actions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<TicketActions>, ApiError> {
    let view = state.tickets.get(&id, &principal).await?;
    let ticket = &view.ticket;
    let next_statuses = if principal.can_change_status(ticket) {
        lifecycle::next_statuses(ticket.status)
    } else {
        Vec::new()
    };

    Ok(Json(TicketActions {
        status: ticket.status,
        next_statuses,
        can_reopen: principal.can_reopen(ticket)
            && lifecycle::is_legal(
                ticket.status,
                TicketStatus::Reopened,
                lifecycle::TransitionKind::Reopen,
            ),
        can_comment: principal.can_comment(ticket),
        can_assign: principal.can_assign(),
    }))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<TicketView>, ApiError> {
    let status = TicketStatus::from_str(&request.status)
        .map_err(|e| ApiError::validation_field("status", e))?;
    let ticket = state.tickets.change_status(&id, &principal, status).await?;
    Ok(Json(ticket))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<AssignTicketRequest>,
) -> Result<Json<TicketView>, ApiError> {
    let ticket = state
        .tickets
        .assign(&id, &principal, &request.department)
        .await?;
    Ok(Json(ticket))
}

pub async fn reopen_ticket(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ReopenTicketRequest>,
) -> Result<Json<TicketView>, ApiError> {
    let ticket = state.tickets.reopen(&id, &principal, &request.reason).await?;
    Ok(Json(ticket))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<TicketView>), ApiError> {
    let ticket = state
        .tickets
        .add_comment(&id, &principal, &request.text)
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}
