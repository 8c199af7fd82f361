use axum::response::{IntoResponse, Response};
use axum::Json;
use relay::PollOutcome;
use serde::Serialize;
use utoipa::ToSchema;

pub(crate) mod frontend_controller;
pub(crate) mod health_check_controller;
pub(crate) mod relay_controller;
pub(crate) mod system_stats_controller;

/// Status body returned by every endpoint that does not return a record.
#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: None,
        }
    }

    pub fn no_data() -> Self {
        Self {
            status: "no data".to_string(),
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "Error".to_string(),
            message: Some(message.to_string()),
        }
    }
}

/// Answers a held poll: the record itself, or the "no data" sentinel.
fn poll_response(outcome: PollOutcome) -> Response {
    match outcome {
        PollOutcome::Record(record) => Json(record).into_response(),
        PollOutcome::NoData => Json(StatusResponse::no_data()).into_response(),
    }
}
