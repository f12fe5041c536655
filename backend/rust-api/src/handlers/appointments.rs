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
        AppointmentResponse, ByDateQuery, CreateAppointmentRequest, ListAppointmentsQuery,
        UpdateAppointmentRequest, UpdateStatusRequest,
    },
    services::{appointment_service::AppointmentService, AppState},
};

fn service(state: &AppState) -> AppointmentService {
    AppointmentService::new(state.mongo.clone())
}

pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListAppointmentsQuery>,
) -> ApiResult<Json<Vec<AppointmentResponse>>> {
    Ok(Json(service(&state).list(&principal, query).await?))
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    AppJson(req): AppJson<CreateAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let appointment = service(&state).create(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<AppointmentResponse>> {
    Ok(Json(service(&state).get(&principal, &id).await?))
}

pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateAppointmentRequest>,
) -> ApiResult<Json<AppointmentResponse>> {
    req.validate()?;
    Ok(Json(service(&state).update(&principal, &id, req).await?))
}

pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    service(&state).delete(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/appointments/{id}/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateStatusRequest>,
) -> ApiResult<Json<AppointmentResponse>> {
    let appointment = service(&state)
        .set_status(&principal, &id, req.status)
        .await?;
    Ok(Json(appointment))
}

pub async fn upcoming(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<AppointmentResponse>>> {
    Ok(Json(service(&state).upcoming(&principal, None).await?))
}

pub async fn by_date(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ByDateQuery>,
) -> ApiResult<Json<Vec<AppointmentResponse>>> {
    Ok(Json(service(&state).by_date(&principal, query.date).await?))
}

pub async fn urgent(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<AppointmentResponse>>> {
    Ok(Json(service(&state).urgent(&principal).await?))
}
