use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use std::sync::Arc;
use validator::Validate;

use super::ApiResult;
use crate::{
    access::Principal,
    extractors::AppJson,
    models::user::{AuthResponse, CurrentUserResponse, LoginRequest, RegisterRequest, UpdateMeRequest},
    services::{auth_service::AuthService, AppState},
};

/// POST /api/v1/auth/register - Create an account and sign it in
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    tracing::info!("Registering new user: {}", req.email);
    let response = AuthService::new(&state).register(req).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let response = AuthService::new(&state).login(req).await?;
    Ok(Json(response))
}

/// GET /api/v1/auth/me
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<CurrentUserResponse>> {
    let user = AuthService::new(&state).current_user(&principal).await?;
    Ok(Json(user))
}

/// PUT /api/v1/auth/me - Update own account fields and role profile
pub async fn update_current_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<UpdateMeRequest>,
) -> ApiResult<Json<CurrentUserResponse>> {
    req.validate()?;

    let user = AuthService::new(&state)
        .update_current_user(&principal, req)
        .await?;
    Ok(Json(user))
}
