use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    handlers::ApiResult,
    services::{
        dashboard_service::{AdminStatistics, DashboardService},
        AppState,
    },
};

/// GET /admin/statistics
pub async fn get_statistics(State(state): State<Arc<AppState>>) -> ApiResult<Json<AdminStatistics>> {
    let stats = DashboardService::new(state.mongo.clone())
        .admin_statistics()
        .await?;
    Ok(Json(stats))
}
