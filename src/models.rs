//! Modelos de dominio: trozos de documento y turnos de conversación.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Un trozo contiguo del documento fuente, unidad de recuperación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    /// Metadatos de origen (p. ej. `source` = ruta del fichero).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// Un turno de conversación: mensaje del usuario y respuesta del asistente.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}
