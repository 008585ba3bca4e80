//! Carga y gestión de configuración de la aplicación (servidor, índice y LLM).

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Cohere,
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cohere" => Ok(Self::Cohere),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Variable de entorno que contiene la API key del proveedor.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Cohere => "COHERE_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }

    fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::Cohere => "embed-english-v3.0",
            Self::OpenAI => "text-embedding-3-small",
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Cohere => "command-r-plus",
            Self::OpenAI => "gpt-4o-mini",
        }
    }
}

const DEFAULT_MAX_SESSIONS: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_temperature: f64,

    pub index_dir: PathBuf,
    pub source_document_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,

    /// `None` = sin límite de turnos por sesión.
    pub max_turns_per_session: Option<usize>,
    pub max_sessions: NonZeroUsize,

    pub frontend_dir: PathBuf,
    pub expose_error_details: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let provider = LlmProvider::Cohere;
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            llm_embedding_model: provider.default_embedding_model().to_string(),
            llm_chat_model: provider.default_chat_model().to_string(),
            llm_provider: provider,
            llm_temperature: 0.3,
            index_dir: PathBuf::from("vectorstore"),
            source_document_path: PathBuf::from("txt/data_for_chatbot_xalt.txt"),
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_top_k: 4,
            max_turns_per_session: Some(50),
            max_sessions: DEFAULT_MAX_SESSIONS,
            frontend_dir: PathBuf::from("frontend"),
            expose_error_details: true,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero con una fuente de variables
    /// arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let llm_provider = match lookup("LLM_PROVIDER") {
            Some(s) => LlmProvider::from_str(&s)?,
            None => defaults.llm_provider.clone(),
        };
        let llm_embedding_model = lookup("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| llm_provider.default_embedding_model().to_string());
        let llm_chat_model = lookup("LLM_CHAT_MODEL")
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());

        let chunk_size = parse_or(&lookup, "CHUNK_SIZE", defaults.chunk_size)?;
        let chunk_overlap = parse_or(&lookup, "CHUNK_OVERLAP", defaults.chunk_overlap)?;
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }

        let retrieval_top_k = parse_or(&lookup, "RETRIEVAL_TOP_K", defaults.retrieval_top_k)?;
        if retrieval_top_k == 0 {
            return Err(anyhow!("RETRIEVAL_TOP_K debe ser mayor que 0"));
        }

        let max_turns: usize = parse_or(
            &lookup,
            "MAX_TURNS_PER_SESSION",
            defaults.max_turns_per_session.unwrap_or(0),
        )?;
        let max_sessions: usize = parse_or(&lookup, "MAX_SESSIONS", defaults.max_sessions.get())?;
        let max_sessions = NonZeroUsize::new(max_sessions)
            .ok_or_else(|| anyhow!("MAX_SESSIONS debe ser mayor que 0"))?;

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            llm_temperature: parse_or(&lookup, "LLM_TEMPERATURE", defaults.llm_temperature)?,
            index_dir: lookup("VECTORSTORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            source_document_path: lookup("SOURCE_DOCUMENT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_document_path),
            chunk_size,
            chunk_overlap,
            retrieval_top_k,
            max_turns_per_session: (max_turns > 0).then_some(max_turns),
            max_sessions,
            frontend_dir: lookup("FRONTEND_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frontend_dir),
            expose_error_details: parse_or(
                &lookup,
                "EXPOSE_ERROR_DETAILS",
                defaults.expose_error_details,
            )?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        None => Ok(default),
    }
}
