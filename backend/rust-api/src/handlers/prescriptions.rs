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
    models::care::{
        ByPatientQuery, CreatePrescriptionRequest, PrescriptionResponse, UpdatePrescriptionRequest,
    },
    services::{prescription_service::PrescriptionService, AppState},
};

fn service(state: &AppState) -> PrescriptionService {
    PrescriptionService::new(state.mongo.clone())
}

pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<PrescriptionResponse>>> {
    Ok(Json(service(&state).list(&principal).await?))
}

pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreatePrescriptionRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let prescription = service(&state).create(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<PrescriptionResponse>> {
    Ok(Json(service(&state).get(&principal, &id).await?))
}

pub async fn update_prescription(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdatePrescriptionRequest>,
) -> ApiResult<Json<PrescriptionResponse>> {
    req.validate()?;
    Ok(Json(service(&state).update(&principal, &id, req).await?))
}

pub async fn delete_prescription(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn active_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<PrescriptionResponse>>> {
    Ok(Json(service(&state).active(&principal).await?))
}

/// GET /api/v1/prescriptions/by-patient?patient_id= - Physicians and admins only
pub async fn by_patient(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ByPatientQuery>,
) -> ApiResult<Json<Vec<PrescriptionResponse>>> {
    let prescriptions = service(&state)
        .by_patient(&principal, query.patient_id)
        .await?;
    Ok(Json(prescriptions))
}
