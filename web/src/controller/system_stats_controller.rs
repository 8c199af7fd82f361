use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::AppState;
use relay::RelayStats;
use service::system_stats::SystemStats;

#[derive(Debug, Serialize)]
struct SystemStatsResponse {
    #[serde(flatten)]
    system: SystemStats,
    relay: RelayStats,
}

/// GET host CPU and memory utilization along with the relay's store sizes
#[utoipa::path(
    get,
    path = "/systemStats",
    responses(
        (status = 200, description = "cpuUsage, memoryUsage, workers and relay store sizes"),
    )
)]
pub async fn system_stats(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(SystemStatsResponse {
        system: SystemStats::collect(),
        relay: app_state.relay_ref().stats(),
    })
}
