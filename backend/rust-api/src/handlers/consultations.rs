use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::{ApiError, ApiResult};
use crate::{
    access::Principal,
    extractors::AppJson,
    models::care::{
        ByTypeQuery, ConsultationResponse, CreateConsultationRequest, EndConsultationRequest,
        ListConsultationsQuery, MessageResponse, PrescriptionResponse, UpdateConsultationRequest,
    },
    services::{consultation_service::ConsultationService, AppState},
};

fn service(state: &AppState) -> ConsultationService {
    ConsultationService::new(state.mongo.clone())
}

pub async fn list_consultations(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListConsultationsQuery>,
) -> ApiResult<Json<Vec<ConsultationResponse>>> {
    Ok(Json(service(&state).list(&principal, query).await?))
}

pub async fn create_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreateConsultationRequest>,
) -> ApiResult<impl IntoResponse> {
    let consultation = service(&state).create(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn get_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConsultationResponse>> {
    Ok(Json(service(&state).get(&principal, &id).await?))
}

pub async fn update_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateConsultationRequest>,
) -> ApiResult<Json<ConsultationResponse>> {
    Ok(Json(service(&state).update(&principal, &id, req).await?))
}

pub async fn delete_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/consultations/{id}/end - Body is optional
pub async fn end_consultation(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ConsultationResponse>> {
    let req: EndConsultationRequest = if body.is_empty() {
        EndConsultationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Failed to parse JSON request body: {}", e)))?
    };
    Ok(Json(service(&state).end(&principal, &id, req).await?))
}

pub async fn active_consultations(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<ConsultationResponse>>> {
    Ok(Json(service(&state).active(&principal).await?))
}

pub async fn by_type(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ByTypeQuery>,
) -> ApiResult<Json<Vec<ConsultationResponse>>> {
    Ok(Json(service(&state).by_type(&principal, query.kind).await?))
}

pub async fn consultation_messages(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    Ok(Json(service(&state).messages(&principal, &id).await?))
}

pub async fn consultation_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PrescriptionResponse>>> {
    Ok(Json(service(&state).prescriptions(&principal, &id).await?))
}
