use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use relay::{Error as RelayError, RelayErrorKind};

use crate::controller::StatusResponse;

extern crate log;

#[derive(Debug)]
pub struct Error(RelayError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

/// Client facing message for a relay error kind.
pub(crate) fn error_message(kind: RelayErrorKind) -> &'static str {
    match kind {
        RelayErrorKind::MissingClientKey => "Missing localip",
        RelayErrorKind::InvalidRecord => "Invalid data format",
    }
}

// Both kinds are caller mistakes and nothing was changed, so both map to 400.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.0.error_kind;
        if let Some(source) = self.0.source.as_ref() {
            log::debug!("Rejecting request: {} ({source})", self.0);
        }
        (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::error(error_message(kind))),
        )
            .into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<RelayError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_maps_to_bad_request() {
        let response = Error::from(RelayError::missing_client_key()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"status": "Error", "message": "Missing localip"})
        );
    }

    #[tokio::test]
    async fn test_invalid_record_maps_to_bad_request() {
        let response = Error::from(RelayError::invalid_record()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"status": "Error", "message": "Invalid data format"})
        );
    }
}
