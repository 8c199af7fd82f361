use axum::extract::State;
use axum::response::IntoResponse;

use crate::controller::poll_response;
use crate::AppState;
use log::*;

/// GET the latest frontend display record, holding the request open until one arrives
#[utoipa::path(
    get,
    path = "/getFrontendData",
    responses(
        (status = 200, description = "The latest record for the display, or {\"status\":\"no data\"} once the poll window closes"),
    )
)]
pub async fn get_frontend_data(State(app_state): State<AppState>) -> impl IntoResponse {
    trace!("Frontend polling for display data");
    poll_response(app_state.relay_ref().poll_frontend().await)
}
