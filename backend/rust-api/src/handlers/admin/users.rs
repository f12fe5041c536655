use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    access::Principal,
    extractors::AppJson,
    handlers::{ApiError, ApiResult},
    models::user::{
        CreateUserRequest, CurrentUserResponse, ListUsersQuery, UpdateUserRequest, UserResponse,
    },
    services::{user_service::UserService, AppState},
};

/// GET /admin/users - Filters: role, search, is_active, limit, offset
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = UserService::new(state.mongo.clone())
        .list_users(query)
        .await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /admin/users - Any role, admins included
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let user = UserService::new(state.mongo.clone()).create_user(req).await?;
    tracing::info!(
        admin_id = %principal.user_id,
        user_id = %user.id,
        "Admin created user"
    );
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /admin/users/{id} - User with its role profile
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CurrentUserResponse>> {
    let service = UserService::new(state.mongo.clone());
    let user = service.get_user(&user_id).await?;
    let profile = service.role_profile(&user).await?;
    Ok(Json(CurrentUserResponse {
        user: UserResponse::from(user),
        profile,
    }))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    req.validate()?;

    let user = UserService::new(state.mongo.clone())
        .update_user(&user_id, req)
        .await?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    if principal.user_id == user_id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    UserService::new(state.mongo.clone())
        .delete_user(&user_id)
        .await?;
    tracing::info!(admin_id = %principal.user_id, user_id = %user_id, "Admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}
