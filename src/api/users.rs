use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{Role, UpdateProfileRequest, User, UserResponse};
use crate::engine::Principal;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
}

pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.directory.update_profile(&user.id, &request.name).await?;
    Ok(Json(UserResponse::from(updated)))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let role = query
        .role
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(Role::from_str)
        .transpose()
        .map_err(|e| ApiError::validation_field("role", e))?;

    let users = state.directory.list_users(&principal, role).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
