use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::controller::{poll_response, StatusResponse};
use crate::params::relay::PollParams;
use crate::{AppState, Error};
use log::*;
use relay::{ClientKey, Record};

/// GET the pending record for a client, holding the request open until one arrives
#[utoipa::path(
    get,
    path = "/getData",
    params(PollParams),
    responses(
        (status = 200, description = "The pending record, or {\"status\":\"no data\"} once the poll window closes"),
        (status = 400, description = "Missing localip", body = StatusResponse),
    )
)]
pub async fn get_data(
    State(app_state): State<AppState>,
    params: Result<Query<PollParams>, QueryRejection>,
) -> Result<impl IntoResponse, Error> {
    // An unreadable query (e.g. a repeated localip) leaves no usable key either
    let localip = match params {
        Ok(Query(params)) => params.localip,
        Err(rejection) => {
            debug!("Rejecting poll query: {rejection}");
            None
        }
    };
    let key = ClientKey::new(localip.unwrap_or_default())?;
    debug!("Client polling for data with IP: {key}");

    let outcome = app_state.relay_ref().poll(&key).await;
    Ok(poll_response(outcome))
}

/// POST a record for a client. The body must be a JSON object carrying `localip`.
#[utoipa::path(
    post,
    path = "/data",
    request_body(content = Object, content_type = "application/json", description = "A JSON object carrying `localip`"),
    responses(
        (status = 200, description = "Record accepted", body = StatusResponse),
        (status = 400, description = "Missing localip or invalid data format", body = StatusResponse),
        (status = 413, description = "Body exceeds the configured size limit"),
    )
)]
pub async fn post_data(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let record = Record::from_slice(&body)?;
    let relay = app_state.relay_ref();

    let delivery = relay.produce(record.clone())?;
    debug!("Received data from web menu, delivery: {delivery:?}");

    // Every accepted record also updates the frontend display feed
    relay.publish_frontend(record);

    Ok(Json(StatusResponse::ok()))
}
