use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::str::FromStr;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    ApprovalResult, RejectRoleRequest, RoleRequest, RoleRequestQuery, RoleRequestStats,
    RoleRequestStatus,
};
use crate::engine::Principal;
use crate::AppState;

pub async fn list_role_requests(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<RoleRequestQuery>,
) -> Result<Json<Vec<RoleRequest>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(RoleRequestStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::validation_field("status", e))?;

    let requests = state.workflow.list(&principal, status).await?;
    Ok(Json(requests))
}

pub async fn role_request_stats(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<RoleRequestStats>, ApiError> {
    if !principal.can_review_role_requests() {
        return Err(ApiError::forbidden(
            "Only administrators can view role request statistics",
        ));
    }
    let stats = state.workflow.stats().await?;
    Ok(Json(stats))
}

pub async fn approve_role_request(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ApprovalResult>, ApiError> {
    let result = state.workflow.approve(&id, &principal).await?;
    Ok(Json(result))
}

pub async fn reject_role_request(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<RejectRoleRequest>,
) -> Result<Json<RoleRequest>, ApiError> {
    let rejected = state
        .workflow
        .reject(&id, &principal, &request.reason)
        .await?;
    Ok(Json(rejected))
}
