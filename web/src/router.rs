use std::sync::Arc;

use crate::{
    controller::{
        frontend_controller, health_check_controller, relay_controller, system_stats_controller,
        StatusResponse,
    },
    middleware::rate_limit::{rate_limit, RateLimitState},
    push::handler::push_handler,
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use log::*;
use service::config::Config;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Device Relay API"
        ),
        paths(
            health_check_controller::health_check,
            relay_controller::get_data,
            relay_controller::post_data,
            frontend_controller::get_frontend_data,
            system_stats_controller::system_stats,
        ),
        components(
            schemas(
                StatusResponse,
            )
        ),
        tags(
            (name = "device_relay", description = "Keyed mailbox relay between web menus and devices")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState, rate_limits: Arc<RateLimitState>) -> Router {
    let config = app_state.config.clone();

    Router::new()
        .merge(health_routes())
        .merge(relay_routes(app_state.clone()))
        .merge(frontend_routes(app_state.clone()))
        .merge(system_stats_routes(app_state.clone()))
        .merge(push_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
        .fallback_service(static_routes(&config))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(from_fn_with_state(rate_limits, rate_limit))
        .layer(cors_layer(&config))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn relay_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/getData", get(relay_controller::get_data))
        .route("/data", post(relay_controller::post_data))
        .with_state(app_state)
}

fn frontend_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/getFrontendData",
            get(frontend_controller::get_frontend_data),
        )
        .with_state(app_state)
}

fn system_stats_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/systemStats", get(system_stats_controller::system_stats))
        .with_state(app_state)
}

fn push_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(push_handler))
        .with_state(app_state)
}

// Anything no route above claims is looked up in the static directory
fn static_routes(config: &Config) -> ServeDir {
    ServeDir::new(&config.static_dir)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}
