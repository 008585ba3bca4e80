//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//!
//! El resto de la aplicación sólo conoce los traits [`Embedder`] y
//! [`ChatModel`]; [`LlmManager`] los implementa para Cohere y OpenAI.

use async_trait::async_trait;
use rig::client::{CompletionClient as _, EmbeddingsClient as _, ProviderClient as _};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::{cohere, openai};
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::error::{ChatbotError, Result};

/// Máximo de textos por petición de embeddings (límite de la API de Cohere).
const EMBED_BATCH_SIZE: usize = 96;

/// Colaborador que convierte texto en vectores.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeddings para trozos que se van a indexar, en el mismo orden.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    /// Embedding de una pregunta del usuario.
    async fn embed_query(&self, text: &str) -> Result<Vec<f64>>;
}

/// Colaborador de chat: recibe el prompt ya renderizado y devuelve el texto.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
enum Backend {
    Cohere(cohere::Client),
    OpenAI(openai::Client),
}

/// Gestor de LLMs y embeddings. Los clientes HTTP se crean una sola vez.
#[derive(Clone)]
pub struct LlmManager {
    backend: Backend,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    ///
    /// Falla si la API key del proveedor no está en el entorno.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let key_var = cfg.llm_provider.api_key_var();
        if std::env::var(key_var).map(|k| k.trim().is_empty()).unwrap_or(true) {
            return Err(ChatbotError::Config(format!("Falta {key_var} en el entorno")));
        }

        let backend = match cfg.llm_provider {
            LlmProvider::Cohere => Backend::Cohere(cohere::Client::from_env()),
            LlmProvider::OpenAI => Backend::OpenAI(openai::Client::from_env()),
        };

        Ok(Self {
            backend,
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    /// `input_type` sólo aplica a Cohere (`search_document` / `search_query`).
    async fn embed_batch(&self, texts: Vec<String>, input_type: &str) -> Result<Vec<Vec<f64>>> {
        let expected = texts.len();
        let embeddings = match &self.backend {
            Backend::Cohere(client) => {
                let model = client.embedding_model(&self.embedding_model, input_type);
                model.embed_texts(texts).await
            }
            Backend::OpenAI(client) => {
                let model = client.embedding_model(&self.embedding_model);
                model.embed_texts(texts).await
            }
        }
        .map_err(|e| ChatbotError::Embedding(e.to_string()))?;

        if embeddings.len() != expected {
            return Err(ChatbotError::Embedding(format!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            )));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn prompt_model(&self, prompt: &str) -> Result<String> {
        let answer = match &self.backend {
            Backend::Cohere(client) => {
                let agent = client
                    .agent(&self.chat_model)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await
            }
            Backend::OpenAI(client) => {
                let agent = client
                    .agent(&self.chat_model)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await
            }
        };

        answer.map_err(|e| ChatbotError::ModelInvocation(e.to_string()))
    }
}

#[async_trait]
impl Embedder for LlmManager {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            debug!("Calculando embeddings para un lote de {} trozos", batch.len());
            vectors.extend(self.embed_batch(batch.to_vec(), "search_document").await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        self.embed_batch(vec![text.to_string()], "search_query")
            .await?
            .pop()
            .ok_or_else(|| ChatbotError::Embedding("No se pudo generar embedding de la query".into()))
    }
}

#[async_trait]
impl ChatModel for LlmManager {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompt_model(prompt).await
    }
}
