//! Orquestación RAG de una pregunta del chat.
//!
//! Flujo:
//!   1. Recuperar los trozos más cercanos a la pregunta.
//!   2. Concatenarlos (en el orden devuelto) como contexto.
//!   3. Renderizar el prompt fijo con historial, contexto y pregunta.
//!   4. Invocar el modelo de chat.
//!   5. Registrar el turno en la memoria de la sesión y devolver el HTML.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::Result,
    llm::ChatModel,
    memory::{ConversationMemory, SessionHistory},
    models::DocumentChunk,
    vector_store::Retriever,
};

/// Instrucciones fijas para el modelo. Forman parte del comportamiento
/// observable del chatbot.
const PROMPT_INSTRUCTIONS: &str = r#"You are a helpful assistant for Xalt Analytics.

Your task is to answer the user's question in a clear, clean, and readable HTML format.
Always format your answers using HTML tags such as:
- <p> for paragraphs
- <ul><li> or <ol><li> for lists
- <a href="..."> for clickable links (for email, phone, or URLs)
- <strong> for emphasis

ONLY respond with specific company information (emails, phone numbers, consultation link, timings, etc.) IF the user explicitly asks for it.

Guidelines:
- For sales-related emails, use: <a href="mailto:sales@xaltanalytics.com">sales@xaltanalytics.com</a>
- For career-related emails, use: <a href="mailto:careers@xaltanalytics.com">careers@xaltanalytics.com</a>
- For phone/contact number, use: <a href="tel:7225020264">7225020264</a> and <a href="tel:9302594888">9302594888</a>
- For consultation, suggest this link: <a href="https://calendly.com/suvi-pandey-xaltanalytics/30min?month=2025-05">Book a consultation</a>
- For office hours: Monday to Friday, 9 AM to 6:30 PM

NEVER reveal any company details unless the user's query specifically asks for them.

If the user greets you (e.g., "Hi", "Hello"), respond politely and ask how you can assist them — but DO NOT provide company details until asked.

If the user's question is unrelated to Xalt Analytics or outside the context provided (e.g., about public figures, general knowledge, or unrelated services), respond with the following polite message in HTML:

<p>I'm here to assist you with queries specifically related to Xalt Analytics and its services. For anything outside this scope, I'm unable to provide information. Please feel free to ask anything about our offerings, consultations, or business details.</p>
"#;

/// Une el texto de los trozos, en orden, separados por una línea en blanco.
pub fn build_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Historial como una línea por mensaje (`Human:` / `AI:`).
pub fn render_history(history: &SessionHistory) -> String {
    history
        .turns()
        .flat_map(|t| [format!("Human: {}", t.user), format!("AI: {}", t.assistant)])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renderiza el prompt completo. Los valores se insertan tal cual, sin
/// reinterpretar llaves ni marcadores que contengan.
pub fn render_prompt(history: &SessionHistory, context: &str, question: &str) -> String {
    format!(
        "{PROMPT_INSTRUCTIONS}\nChat History:\n{}\n\nRelevant Context:\n{context}\n\nUser Question:\n{question}\n\nHTML Response:\n",
        render_history(history)
    )
}

/// Orquestador de respuestas: recuperación, prompt, generación y memoria.
pub struct ChatOrchestrator {
    retriever: Arc<dyn Retriever>,
    chat_model: Arc<dyn ChatModel>,
    memory: Arc<ConversationMemory>,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        chat_model: Arc<dyn ChatModel>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        Self {
            retriever,
            chat_model,
            memory,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Responde `question` en el contexto de la sesión `session_id`.
    ///
    /// Si la recuperación o el modelo fallan, no se registra ningún turno.
    pub async fn answer(&self, question: &str, session_id: &str) -> Result<String> {
        let history = self.memory.get_history(session_id);

        let chunks = self.retriever.retrieve(question).await?;
        debug!("{} trozos recuperados para la sesión {session_id}", chunks.len());
        let context = build_context(&chunks);

        let prompt = render_prompt(&history, &context, question);
        let answer = self.chat_model.complete(&prompt).await?;

        self.memory.append_turn(session_id, question, &answer);
        info!(
            "Sesión {session_id}: respuesta generada ({} turnos en memoria)",
            self.memory.len(session_id)
        );
        Ok(answer)
    }
}
