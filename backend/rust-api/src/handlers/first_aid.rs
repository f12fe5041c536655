use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::ApiResult;
use crate::{
    access::Principal,
    extractors::AppJson,
    models::{
        first_aid::{ContentResponse, ContentTypeQuery, ListModulesQuery, ModuleIdQuery, ModuleResponse},
        quiz::{
            ModuleSummary, PublicQuestion, PublicQuiz, QuizResultResponse, SubmitQuizRequest,
            SubmitQuizResponse,
        },
    },
    services::{first_aid_service::FirstAidService, quiz_service::QuizSubmissionService, AppState},
};

fn service(state: &AppState) -> FirstAidService {
    FirstAidService::new(state.mongo.clone())
}

// ---- modules ----------------------------------------------------------------

pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListModulesQuery>,
) -> ApiResult<Json<Vec<ModuleResponse>>> {
    Ok(Json(service(&state).list_modules(query).await?))
}

pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> ApiResult<Json<ModuleResponse>> {
    Ok(Json(service(&state).get_module(&module_id).await?))
}

pub async fn module_contents(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> ApiResult<Json<Vec<ContentResponse>>> {
    Ok(Json(service(&state).module_contents(&module_id).await?))
}

pub async fn module_quizzes(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> ApiResult<Json<Vec<PublicQuiz>>> {
    Ok(Json(service(&state).module_quizzes(&module_id).await?))
}

pub async fn modules_by_category(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BTreeMap<String, Vec<ModuleResponse>>>> {
    Ok(Json(service(&state).modules_by_category().await?))
}

pub async fn modules_by_difficulty(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BTreeMap<&'static str, Vec<ModuleResponse>>>> {
    Ok(Json(service(&state).modules_by_difficulty().await?))
}

// ---- contents ---------------------------------------------------------------

pub async fn list_contents(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ContentResponse>>> {
    Ok(Json(service(&state).list_contents().await?))
}

pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> ApiResult<Json<ContentResponse>> {
    Ok(Json(service(&state).get_content(&content_id).await?))
}

pub async fn contents_by_module(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModuleIdQuery>,
) -> ApiResult<Json<Vec<ContentResponse>>> {
    Ok(Json(service(&state).contents_by_module(query.module_id).await?))
}

pub async fn contents_by_type(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContentTypeQuery>,
) -> ApiResult<Json<Vec<ContentResponse>>> {
    Ok(Json(service(&state).contents_by_type(query).await?))
}

// ---- quizzes ----------------------------------------------------------------

pub async fn list_quizzes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<PublicQuiz>>> {
    Ok(Json(service(&state).list_quizzes().await?))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> ApiResult<Json<PublicQuiz>> {
    Ok(Json(service(&state).get_quiz(&quiz_id).await?))
}

pub async fn quiz_questions(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> ApiResult<Json<Vec<PublicQuestion>>> {
    Ok(Json(service(&state).quiz_questions(&quiz_id).await?))
}

pub async fn quizzes_by_module(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModuleIdQuery>,
) -> ApiResult<Json<Vec<PublicQuiz>>> {
    Ok(Json(service(&state).quizzes_by_module(query.module_id).await?))
}

/// POST /api/v1/first-aid/quizzes/{id}/submit - Grade answers, store the result
/// and update the caller's module progress
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> ApiResult<Json<SubmitQuizResponse>> {
    // Quizzes of unpublished modules are not submittable
    service(&state).published_quiz(&quiz_id).await?;

    let outcome = QuizSubmissionService::new(&state)
        .submit(&principal.user_id, &quiz_id, &req.answers)
        .await?;

    Ok(Json(SubmitQuizResponse::new(
        outcome.result,
        outcome.created,
        outcome.progress,
    )))
}

// ---- results ----------------------------------------------------------------

pub async fn my_results(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<QuizResultResponse>>> {
    Ok(Json(service(&state).results(&principal.user_id).await?))
}

pub async fn my_results_by_module(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ModuleIdQuery>,
) -> ApiResult<Json<Vec<QuizResultResponse>>> {
    let results = service(&state)
        .results_by_module(&principal.user_id, query.module_id)
        .await?;
    Ok(Json(results))
}

pub async fn my_summary(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<ModuleSummary>>> {
    Ok(Json(service(&state).summary(&principal.user_id).await?))
}
