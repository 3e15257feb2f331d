use std::net;
use std::sync;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use slog::{debug, info, warn};

use crate::state;
use crate::weather;

/// Shared handler context: the station state, the outbound weather client and
/// the CORS allow-list, injected through axum's state instead of globals.
#[derive(Clone)]
pub struct App {
    pub log: slog::Logger,
    pub station: sync::Arc<state::Station>,
    pub weather: weather::WeatherClient,
    pub cors_allowed_origins: sync::Arc<Vec<String>>,
}

pub fn build_router(app: App) -> Router {
    Router::new()
        .route("/api/climate", post(post_climate))
        .route("/api/soil", post(post_soil))
        .route("/api/arduino/sensors", post(post_arduino_sensors))
        .route("/api/pump", get(get_pump).post(post_pump))
        .route("/api/status", get(get_status))
        .route("/api/arduino/pump", get(get_arduino_pump))
        .route("/api/weather", get(get_weather))
        .route("/health", get(get_health))
        .layer(from_fn_with_state(app.clone(), cors_middleware))
        .with_state(app)
}

pub async fn run(app: App, listen: &str) -> Result<(), failure::Error> {
    let addr: net::SocketAddr = listen
        .parse()
        .map_err(|e| failure::format_err!("invalid listen address {}: {}", listen, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(app.log, "listening"; "addr" => %addr);

    let log = app.log.clone();
    axum::serve(listener, build_router(app))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(log, "shutting down");
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Validation failures answer with a static message and leave all state
/// untouched; there is never a partial application of valid fields.
fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

async fn post_climate(
    State(app): State<App>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let temperature = body.get("temperature").and_then(serde_json::Value::as_f64);
    let humidity = body.get("humidity").and_then(serde_json::Value::as_f64);
    match (temperature, humidity) {
        (Some(temperature), Some(humidity)) => {
            let reading = app.station.record_climate(temperature, humidity);
            info!(app.log, "climate data received";
                  "temperature" => reading.temperature, "humidity" => reading.humidity);
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        _ => {
            debug!(app.log, "rejected climate payload"; "body" => body.to_string());
            bad_request("Invalid data format")
        }
    }
}

async fn post_soil(State(app): State<App>, Json(body): Json<serde_json::Value>) -> Response {
    match body.get("moisture").and_then(serde_json::Value::as_f64) {
        Some(moisture) => {
            let (reading, pump) = app.station.record_soil(moisture);
            info!(app.log, "soil data received";
                  "moisture" => reading.moisture, "pump" => pump.active);
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        None => {
            debug!(app.log, "rejected soil payload"; "body" => body.to_string());
            bad_request("Invalid moisture value")
        }
    }
}

async fn post_arduino_sensors(
    State(app): State<App>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let temperature = body.get("temperature").and_then(serde_json::Value::as_f64);
    let humidity = body.get("humidity").and_then(serde_json::Value::as_f64);
    let moisture = body.get("moisture").and_then(serde_json::Value::as_f64);
    match (temperature, humidity, moisture) {
        (Some(temperature), Some(humidity), Some(moisture)) => {
            let reading = app.station.record_sensors(temperature, humidity, moisture);
            info!(app.log, "device readings received";
                  "temperature" => reading.temperature,
                  "humidity" => reading.humidity,
                  "moisture" => reading.moisture,
                  "pump" => reading.pump_active);
            (
                StatusCode::OK,
                Json(json!({ "status": "success", "data": reading })),
            )
                .into_response()
        }
        _ => {
            debug!(app.log, "rejected device payload"; "body" => body.to_string());
            bad_request("Invalid data format")
        }
    }
}

async fn post_pump(State(app): State<App>, Json(body): Json<serde_json::Value>) -> Response {
    let active = match body.get("action").and_then(serde_json::Value::as_str) {
        Some("on") => true,
        Some("off") => false,
        _ => {
            debug!(app.log, "rejected pump command"; "body" => body.to_string());
            return bad_request("Invalid command. Use on or off");
        }
    };
    let pump = app.station.set_pump_manual(active);
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "pumpStatus": pump })),
    )
        .into_response()
}

async fn get_pump(State(app): State<App>) -> Response {
    Json(json!({ "pumpStatus": app.station.pump() })).into_response()
}

async fn get_status(State(app): State<App>) -> Response {
    // Always 200; climate and soil are null until the first ingest.
    Json(app.station.snapshot()).into_response()
}

/// Leveled pull-based command channel for the actuator: plain text, no ack,
/// no delivery guarantee. A missed poll is re-read next cycle.
async fn get_arduino_pump(State(app): State<App>) -> Response {
    app.station.pump().command().into_response()
}

async fn get_weather(State(app): State<App>) -> Response {
    match app.weather.current().await {
        Ok(now) => Json(now).into_response(),
        Err(e) => {
            warn!(app.log, "weather fetch failed"; "error" => %e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch weather data" })),
            )
                .into_response()
        }
    }
}

async fn get_health(State(app): State<App>) -> Response {
    Json(json!({
        "status": "healthy",
        "uptime": app.station.uptime_secs(),
    }))
    .into_response()
}

async fn cors_middleware(State(app): State<App>, req: Request<Body>, next: Next) -> Response {
    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if req.method() == Method::OPTIONS {
        // Preflight: answer 204 with no body.
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if let Some(value) = allowed_origin(&app.cors_allowed_origins, origin.as_deref()) {
            let headers = resp.headers_mut();
            headers.insert("access-control-allow-origin", value);
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET,POST,OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("content-type"),
            );
        }
        return resp;
    }

    let mut resp = next.run(req).await;
    if let Some(value) = allowed_origin(&app.cors_allowed_origins, origin.as_deref()) {
        resp.headers_mut()
            .insert("access-control-allow-origin", value);
        resp.headers_mut()
            .insert("vary", HeaderValue::from_static("Origin"));
    }
    resp
}

fn allowed_origin(allowed: &[String], origin: Option<&str>) -> Option<HeaderValue> {
    if allowed.iter().any(|o| o == "*") {
        return Some(HeaderValue::from_static("*"));
    }
    let origin = origin?;
    if allowed.iter().any(|o| o == origin) {
        HeaderValue::from_str(origin).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_any_origin() {
        let allowed = vec!["*".to_owned()];
        assert_eq!(
            allowed_origin(&allowed, Some("http://example.com")),
            Some(HeaderValue::from_static("*"))
        );
        // The wildcard applies even without an Origin header.
        assert_eq!(
            allowed_origin(&allowed, None),
            Some(HeaderValue::from_static("*"))
        );
    }

    #[test]
    fn allow_list_echoes_matching_origin_only() {
        let allowed = vec!["http://dash.local".to_owned()];
        assert_eq!(
            allowed_origin(&allowed, Some("http://dash.local")),
            Some(HeaderValue::from_static("http://dash.local"))
        );
        assert_eq!(allowed_origin(&allowed, Some("http://evil.local")), None);
        assert_eq!(allowed_origin(&allowed, None), None);
    }
}
