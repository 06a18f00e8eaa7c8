//! HTTP routes.

use std::sync::Arc;

use assessment::{DataSource, WeatherService};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::ingest::Ingestor;

const SERVICE_NAME: &str = "disaster-alert";
const DEFAULT_LOCATION: &str = "Mumbai";

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
    pub ingest: Arc<Ingestor>,
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/weather", get(weather))
        .route("/refresh", get(refresh))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub simulation: Option<String>,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

/// Attach `Retry-After` to 503 responses that carry a hint.
fn with_retry_after(mut response: Response, retry_after: Option<u64>) -> Response {
    if response.status() == StatusCode::SERVICE_UNAVAILABLE {
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
    }
    response
}

/// GET /weather
pub async fn weather(State(state): State<AppState>, Query(query): Query<WeatherQuery>) -> Response {
    let simulation = query
        .simulation
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match state.service.weather(&query.location, simulation).await {
        Ok(payload) => {
            if payload.source() == DataSource::LiveApi {
                state.ingest.trigger_after_live_fetch();
            }
            let status =
                StatusCode::from_u16(payload.status_code()).unwrap_or(StatusCode::OK);
            let retry_after = payload.retry_after();
            with_retry_after((status, Json(payload)).into_response(), retry_after)
        }
        Err(err) => {
            warn!("Weather request for '{}' failed: {}", query.location, err);
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            with_retry_after((status, Json(err.body())).into_response(), err.retry_after())
        }
    }
}

/// GET /refresh
pub async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    let message = if state.ingest.trigger() {
        info!("Manual refresh started");
        "Global weather refresh started in background"
    } else {
        "A weather refresh is already in progress"
    };

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": message,
            "monitored_places": state.ingest.monitored_places(),
        })),
    )
}

/// GET /
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "cached_locations": state.service.cached_locations(),
        "timestamp": Utc::now(),
    }))
}
