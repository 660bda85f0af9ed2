//! HTTP endpoint layer

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use multiweather_core::{Aggregator, WeatherReport};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info};

const JSON_UTF8: &str = "application/json; charset=utf-8";

struct AppState {
    aggregator: Arc<Aggregator>,
}

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    let state = Arc::new(AppState { aggregator });

    Router::new()
        .route("/weather/{*city}", get(weather_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn serve(aggregator: Arc<Aggregator>, port: u16) -> Result<()> {
    let providers: Vec<_> = aggregator.providers().iter().map(|p| p.name().to_string()).collect();
    let app = router(aggregator);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {addr} with providers [{}]", providers.join(", "));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server shutting down");

    Ok(())
}

async fn weather_handler(
    State(state): State<Arc<AppState>>,
    Path(city): Path<String>,
) -> Response {
    let begin = Instant::now();

    let temp = match state.aggregator.temperature(&city).await {
        Ok(temp) => temp,
        Err(err) => {
            debug!("{city}: responding 500: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let report = WeatherReport::new(city, temp, begin.elapsed());
    match serde_json::to_string(&report) {
        Ok(body) => ([(header::CONTENT_TYPE, JSON_UTF8)], body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "providers": state.aggregator.providers().len(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
