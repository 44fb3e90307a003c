//! HTTP server for form extraction.

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use axum::{
    Json, Router,
    extract::{Query, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use oar_forms::core::errors::FormError;
use oar_forms::pipeline::{BatchRunner, factory_from_config};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across handlers
struct AppState {
    runner: Arc<BatchRunner>,
    impersonating: Arc<BatchRunner>,
    cache: ResponseCache,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Query parameters of `/process_images`
#[derive(Debug, Deserialize)]
struct ProcessQuery {
    #[serde(rename = "folderPath")]
    folder_path: Option<String>,
    imp: Option<String>,
}

impl ProcessQuery {
    /// `imp=1` switches to impersonation; anything else, including a non-number, does not.
    fn impersonate(&self) -> bool {
        self.imp
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            == Some(1)
    }
}

/// Run the HTTP server
pub async fn run_server(app: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Loading extraction pipeline...");
    let factory = factory_from_config(app.form.clone())?;
    // Build one processor up front so model problems surface before binding.
    factory()?;
    let runner = Arc::new(app.batch_runner(factory.clone(), false)?);
    let impersonating = Arc::new(app.batch_runner(factory, true)?);
    info!("Extraction pipeline loaded successfully");

    let server = &app.form.server;
    let state = Arc::new(AppState {
        runner,
        impersonating,
        cache: ResponseCache::new(Duration::from_secs(server.cache_ttl_secs)),
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_router = Router::new()
        .route("/health", get(health_handler))
        .route("/process_images", get(process_images_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET /health                                - Health check");
    info!("  GET /process_images?folderPath=..&imp=0|1 - Form extraction");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Extraction endpoint: every image under `folderPath`, grouped by folder.
async fn process_images_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    Query(query): Query<ProcessQuery>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let cache_key = raw_query.unwrap_or_default();

    if let Some(body) = state.cache.get(&cache_key) {
        info!(request_id = %request_id, query = %cache_key, "Serving cached response");
        return (StatusCode::OK, Json(body)).into_response();
    }

    let Some(folder) = query.folder_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        warn!(request_id = %request_id, "folderPath parameter is missing");
        return error_response(StatusCode::BAD_REQUEST, "folderPath parameter is missing");
    };
    let path = PathBuf::from(folder);
    if !path.exists() {
        warn!(request_id = %request_id, path = %path.display(), "Invalid path");
        return error_response(StatusCode::BAD_REQUEST, "Invalid path");
    }

    let impersonate = query.impersonate();
    info!(
        request_id = %request_id,
        path = %path.display(),
        impersonate,
        "Processing extraction request"
    );
    let runner = if impersonate {
        state.impersonating.clone()
    } else {
        state.runner.clone()
    };

    let start = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || runner.run_path(&path)).await;
    match outcome {
        Ok(Ok(report)) => {
            info!(
                request_id = %request_id,
                images = report.image_count,
                failed = report.failed_count(),
                total_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Extraction completed"
            );
            let body = report.to_caller_json();
            state.cache.insert(cache_key, body.clone());
            tracing::debug!(entries = state.cache.len(), "Response cached");
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Err(err)) => {
            let (status, message) = error_reply(&err);
            error!(request_id = %request_id, error = %err, "Extraction failed");
            error_response(status, message)
        }
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Extraction task aborted");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Status and message for a failed batch: caller mistakes are 400, the rest 500.
fn error_reply(err: &FormError) -> (StatusCode, String) {
    match err {
        FormError::InvalidInput { message } => (StatusCode::BAD_REQUEST, message.clone()),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oar_forms::core::errors::ProcessingStage;

    fn query(imp: Option<&str>) -> ProcessQuery {
        ProcessQuery {
            folder_path: Some("/scans".to_string()),
            imp: imp.map(str::to_string),
        }
    }

    #[test]
    fn test_impersonation_flag() {
        assert!(query(Some("1")).impersonate());
        assert!(!query(Some("0")).impersonate());
        assert!(!query(Some("yes")).impersonate());
        assert!(!query(None).impersonate());
    }

    #[test]
    fn test_error_reply_status() {
        let (status, message) =
            error_reply(&FormError::invalid_input("no valid image files found in /scans"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "no valid image files found in /scans");

        let (status, _) = error_reply(&FormError::stage_error(
            ProcessingStage::BatchProcessing,
            "worker pool could not be built",
        ));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_query_parsing() {
        let parsed: ProcessQuery =
            serde_json::from_value(json!({"folderPath": "/data/scans", "imp": "1"})).unwrap();
        assert_eq!(parsed.folder_path.as_deref(), Some("/data/scans"));
        assert!(parsed.impersonate());
    }
}
