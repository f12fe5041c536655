use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use super::ApiResult;
use crate::{
    access::Principal,
    models::user::{PatientProfileResponse, PhysicianProfileResponse},
    services::{profile_service::ProfileService, AppState},
};

pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<PatientProfileResponse>>> {
    let profiles = ProfileService::new(state.mongo.clone())
        .list_patients(&principal)
        .await?;
    Ok(Json(profiles))
}

pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<PatientProfileResponse>> {
    let profile = ProfileService::new(state.mongo.clone())
        .get_patient(&principal, &user_id)
        .await?;
    Ok(Json(profile))
}

pub async fn list_physicians(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<PhysicianProfileResponse>>> {
    let profiles = ProfileService::new(state.mongo.clone())
        .list_physicians(&principal)
        .await?;
    Ok(Json(profiles))
}

pub async fn get_physician(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<PhysicianProfileResponse>> {
    let profile = ProfileService::new(state.mongo.clone())
        .get_physician(&principal, &user_id)
        .await?;
    Ok(Json(profile))
}
