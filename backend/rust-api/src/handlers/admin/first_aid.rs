use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::ApiResult,
    models::{
        first_aid::{
            ContentRequest, ContentResponse, CreateModuleRequest, ModuleResponse,
            UpdateContentRequest, UpdateModuleRequest,
        },
        quiz::{AdminQuiz, CreateQuizRequest, ReplaceQuestionsRequest, UpdateQuizRequest},
    },
    services::{first_aid_service::FirstAidService, AppState},
};

fn service(state: &AppState) -> FirstAidService {
    FirstAidService::new(state.mongo.clone())
}

pub async fn create_module(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateModuleRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let module = service(&state).create_module(req).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

pub async fn update_module(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
    AppJson(req): AppJson<UpdateModuleRequest>,
) -> ApiResult<Json<ModuleResponse>> {
    req.validate()?;
    Ok(Json(service(&state).update_module(&module_id, req).await?))
}

pub async fn add_content(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
    AppJson(req): AppJson<ContentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let content = service(&state).add_content(&module_id, req).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

pub async fn update_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
    AppJson(req): AppJson<UpdateContentRequest>,
) -> ApiResult<Json<ContentResponse>> {
    req.validate()?;
    Ok(Json(service(&state).update_content(&content_id, req).await?))
}

pub async fn delete_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete_content(&content_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
    AppJson(req): AppJson<CreateQuizRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let quiz = service(&state).create_quiz(&module_id, req).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// GET /admin/first-aid/quizzes/{id} - Includes option correctness
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> ApiResult<Json<AdminQuiz>> {
    Ok(Json(service(&state).admin_quiz(&quiz_id).await?))
}

pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<UpdateQuizRequest>,
) -> ApiResult<Json<AdminQuiz>> {
    req.validate()?;
    Ok(Json(service(&state).update_quiz(&quiz_id, req).await?))
}

/// PUT /admin/first-aid/quizzes/{id}/questions - Replaces the whole question set
pub async fn replace_questions(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<ReplaceQuestionsRequest>,
) -> ApiResult<Json<AdminQuiz>> {
    req.validate()?;
    Ok(Json(service(&state).replace_questions(&quiz_id, req).await?))
}
