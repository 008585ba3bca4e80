//! Taxonomía de errores del chatbot y su correspondencia con códigos HTTP.

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// Errores que pueden producirse en la construcción del índice o al
/// responder una pregunta.
#[derive(Debug, Error)]
pub enum ChatbotError {
    /// Entrada del cliente inválida (p. ej. pregunta vacía).
    #[error("{0}")]
    InputValidation(String),

    /// No se pudo leer el documento fuente.
    #[error("No se pudo leer el fichero {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error de embeddings: {0}")]
    Embedding(String),

    /// El índice persistido no se puede leer, escribir o es inconsistente.
    #[error("Error del índice vectorial: {0}")]
    Index(String),

    #[error("Error de recuperación: {0}")]
    Retrieval(String),

    #[error("Error invocando el modelo de chat: {0}")]
    ModelInvocation(String),

    #[error("Configuración inválida: {0}")]
    Config(String),

    /// El cuerpo de la petición no es un objeto JSON utilizable.
    #[error("Petición inválida: {0}")]
    Request(String),
}

impl ChatbotError {
    /// Código HTTP con el que se expone el error en la fachada.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InputValidation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatbotError>;
