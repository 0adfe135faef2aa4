use std::sync::{Arc, Mutex};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use facegate_vision::FaceEngine;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::error::Error;
use crate::recognize::Recognizer;

pub const GREETING: &str = "facegate is up. POST {\"image\": \"<base64>\"} to / to identify a face.\n";

pub struct AppState {
    engine: Mutex<Box<dyn FaceEngine + Send>>,
    recognizer: Recognizer,
}

impl AppState {
    pub fn new(engine: Box<dyn FaceEngine + Send>, recognizer: Recognizer) -> Self {
        Self {
            engine: Mutex::new(engine),
            recognizer,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub name: String,
}

#[derive(Debug)]
pub enum ApiError {
    Rejected(JsonRejection),
    Recognition(Error),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Recognition(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Rejected(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Recognition(err) => {
                let status = match &err {
                    e if e.is_bad_input() => StatusCode::BAD_REQUEST,
                    Error::NotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            log::error!("request failed: {message}");
        } else {
            log::warn!("rejected request: {message}");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root).post(recognize))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn root() -> &'static str {
    GREETING
}

async fn recognize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecognizeRequest>, JsonRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let Json(request) = payload?;

    let name = tokio::task::spawn_blocking(move || {
        // a panicked inference leaves the engine usable
        let mut engine = state.engine.lock().unwrap_or_else(|p| p.into_inner());
        state
            .recognizer
            .recognize_base64(&mut **engine, &request.image)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("recognition task failed: {e}")))??;

    Ok(Json(RecognizeResponse { name }))
}

/// Serves until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutting down"),
        Err(e) => {
            log::error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await
        }
    }
}
