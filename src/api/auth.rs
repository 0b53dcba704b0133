use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    LoginRequest, LoginResponse, RegistrationOutcome, RegistrationRequest,
    ResendVerificationRequest, User, UserResponse, VerifyRegistrationRequest,
};
use crate::engine::Principal;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub email: String,
    pub expires_at: String,
}

/// Registration endpoint: citizen, employee or admin
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), ApiError> {
    let outcome = state.workflow.submit_registration(request).await?;
    let status = match outcome {
        RegistrationOutcome::NeedsVerification { .. } => StatusCode::ACCEPTED,
        RegistrationOutcome::AutoApproved { .. } | RegistrationOutcome::RequiresApproval { .. } => {
            StatusCode::CREATED
        }
    };
    Ok((status, Json(outcome)))
}

/// Confirm the emailed code and sign the new citizen in
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRegistrationRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .workflow
        .verify_registration(&request.email, &request.code)
        .await?;
    let token = state.directory.create_session(&user.id).await?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

pub async fn resend(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResendVerificationRequest>,
) -> Result<Json<ResendResponse>, ApiError> {
    let expires_at = state.workflow.resend_verification(&request.email).await?;
    Ok(Json(ResendResponse {
        email: crate::db::normalize_email(&request.email),
        expires_at,
    }))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = state
        .directory
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = extract_token(&headers).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    state.directory.revoke_session(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bearer token from the Authorization header
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    state
        .directory
        .resolve_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session is invalid or has expired"))
}

/// Rejects requests without a live session and stashes the user for extractors
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = current_user(&state, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }
        current_user(state, &parts.headers).await
    }
}

/// Extractor for the caller's role and department
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        Ok(Principal::from(&user))
    }
}
