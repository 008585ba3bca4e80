use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
};
use tracing::{error, info};

use crate::{app_state::AppState, error::ChatbotError};

const DEFAULT_SESSION_ID: &str = "default";
const NO_QUERY_ERROR: &str = "No query provided";

// --- Payloads y Respuestas de la API ---

#[derive(Serialize)]
pub struct ChatResponse {
    response: String,
}

type ApiError = (StatusCode, Json<Value>);

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let frontend = &app_state.config.frontend_dir;
    let index_page = ServeFile::new(frontend.join("index.html"));
    let static_dir = ServeDir::new(frontend.join("static"));

    Router::new()
        .route_service("/", index_page)
        .nest_service("/static", static_dir)
        .route("/chat", post(chat_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let expose = state.config.expose_error_details;
    let fail = |err: ChatbotError| {
        error!("Error al procesar /chat: {err}");
        error_response(&err, expose)
    };

    // Cuerpo ilegible o que no es un objeto: error del servidor, no pregunta ausente.
    let Json(body) =
        payload.map_err(|rejection| fail(ChatbotError::Request(rejection.body_text())))?;
    let Value::Object(mut fields) = body else {
        return Err(fail(ChatbotError::Request(
            "el cuerpo debe ser un objeto JSON".to_string(),
        )));
    };

    let question = match fields.remove("message") {
        Some(Value::String(message)) if !message.is_empty() => message,
        _ => {
            return Err(error_response(
                &ChatbotError::InputValidation(NO_QUERY_ERROR.to_string()),
                expose,
            ))
        }
    };
    let session_id = match fields.remove("session_id") {
        None | Some(Value::Null) => DEFAULT_SESSION_ID.to_string(),
        Some(Value::String(id)) => id,
        Some(other) => {
            return Err(fail(ChatbotError::Request(format!(
                "session_id debe ser una cadena, no {other}"
            ))))
        }
    };

    info!(
        "Petición de chat recibida (sesión {session_id}, {} caracteres)",
        question.chars().count()
    );

    match state.orchestrator.answer(&question, &session_id).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            error!("Error al procesar la consulta de la sesión {session_id}: {e}");
            Err(error_response(&e, expose))
        }
    }
}

/// Traduce un error a `(status, {"error": ...})`. Con `expose_details`
/// desactivado, los 5xx no revelan el mensaje interno.
fn error_response(err: &ChatbotError, expose_details: bool) -> ApiError {
    let status = err.status_code();
    let message = if expose_details || status.is_client_error() {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };
    (status, Json(json!({ "error": message })))
}
