use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiResult;
use crate::{
    access::Principal,
    extractors::AppJson,
    models::{
        care::{ConsultationIdQuery, ConsultationRefRequest, CreateMessageRequest, MessageResponse},
        StatusMessage,
    },
    services::{message_service::MessageService, AppState},
};

fn service(state: &AppState) -> MessageService {
    MessageService::new(state.mongo.clone())
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    Ok(Json(service(&state).list(&principal).await?))
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreateMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let message = service(&state).create(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    Ok(Json(service(&state).get(&principal, &id).await?))
}

pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    Ok(Json(service(&state).mark_read(&principal, &id).await?))
}

/// POST /api/v1/messages/read-all - `{"consultation_id": "..."}`
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<ConsultationRefRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let status = service(&state)
        .mark_all_read(&principal, req.consultation_id)
        .await?;
    Ok(Json(status))
}

pub async fn unread_messages(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    Ok(Json(service(&state).unread(&principal).await?))
}

pub async fn by_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ConsultationIdQuery>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = service(&state)
        .by_consultation(&principal, query.consultation_id)
        .await?;
    Ok(Json(messages))
}
