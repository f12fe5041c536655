use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use super::ApiResult;
use crate::{
    access::Principal,
    services::{
        dashboard_service::{DashboardService, PatientDashboard, PhysicianDashboard},
        AppState,
    },
};

pub async fn patient_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<PatientDashboard>> {
    let dashboard = DashboardService::new(state.mongo.clone())
        .patient(&principal)
        .await?;
    Ok(Json(dashboard))
}

pub async fn physician_dashboard(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<PhysicianDashboard>> {
    let dashboard = DashboardService::new(state.mongo.clone())
        .physician(&principal)
        .await?;
    Ok(Json(dashboard))
}
