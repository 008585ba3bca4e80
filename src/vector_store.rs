//! Índice vectorial local persistido en disco.
//!
//! API pública:
//!   - `SimilarityIndex::{load, load_or_new, save, add_chunks, search}`
//!   - `Retriever` y su implementación `VectorRetriever`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ChatbotError, Result};
use crate::llm::Embedder;
use crate::models::DocumentChunk;

pub const INDEX_FILE_NAME: &str = "index.json";

/// Trozo indexado junto con su embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    pub embedding: Vec<f64>,
}

/// Índice plano con búsqueda exacta por distancia euclídea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityIndex {
    pub dimensions: Option<usize>,
    pub chunks: Vec<IndexedChunk>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            dimensions: None,
            chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl SimilarityIndex {
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE_NAME).is_file()
    }

    /// Lee el índice de `dir/index.json`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE_NAME);
        let raw = fs::read_to_string(&path).map_err(|source| ChatbotError::FileAccess {
            path: path.clone(),
            source,
        })?;
        let index: Self = serde_json::from_str(&raw)
            .map_err(|e| ChatbotError::Index(format!("{} corrupto: {e}", path.display())))?;
        info!(
            "Índice vectorial cargado desde {} ({} trozos).",
            path.display(),
            index.len()
        );
        Ok(index)
    }

    /// Carga el índice si existe; si no, devuelve uno vacío.
    pub fn load_or_new(dir: &Path) -> Result<(Self, bool)> {
        if Self::exists(dir) {
            Ok((Self::load(dir)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// Sobrescribe `dir/index.json`. Escribe primero a un temporal y renombra.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|source| ChatbotError::FileAccess {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(INDEX_FILE_NAME);
        let tmp = dir.join(format!("{INDEX_FILE_NAME}.tmp"));
        let raw = serde_json::to_vec(self).map_err(|e| ChatbotError::Index(e.to_string()))?;
        fs::write(&tmp, raw).map_err(|source| ChatbotError::FileAccess {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ChatbotError::FileAccess { path, source })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Añade trozos con sus embeddings al final del índice.
    ///
    /// Todos los vectores deben tener la misma dimensión que los ya indexados.
    pub fn add_chunks(&mut self, chunks: Vec<DocumentChunk>, embeddings: Vec<Vec<f64>>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(ChatbotError::Index(format!(
                "{} trozos pero {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        for embedding in &embeddings {
            match self.dimensions {
                Some(dims) if dims != embedding.len() => {
                    return Err(ChatbotError::Index(format!(
                        "Dimensión del embedding ({}) distinta a la del índice ({dims})",
                        embedding.len()
                    )));
                }
                Some(_) => {}
                None => self.dimensions = Some(embedding.len()),
            }
        }

        self.chunks.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding }),
        );
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Los `k` trozos más cercanos a `query`, del más al menos cercano.
    pub fn search(&self, query: &[f64], k: usize) -> Result<Vec<(f64, &DocumentChunk)>> {
        if let Some(dims) = self.dimensions {
            if dims != query.len() {
                return Err(ChatbotError::Retrieval(format!(
                    "Dimensión de la query ({}) distinta a la del índice ({dims})",
                    query.len()
                )));
            }
        }

        let mut scored: Vec<(f64, &DocumentChunk)> = self
            .chunks
            .iter()
            .map(|c| (squared_l2(query, &c.embedding), &c.chunk))
            .collect();
        // sort estable: a igual distancia, gana el orden de inserción
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);
        Ok(scored)
    }
}

fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Colaborador de recuperación usado por el orquestador.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<Vec<DocumentChunk>>;
}

/// Recupera trozos del índice cargado embebiendo la pregunta.
pub struct VectorRetriever {
    index: Arc<SimilarityIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(index: Arc<SimilarityIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<DocumentChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| ChatbotError::Retrieval(e.to_string()))?;
        Ok(self
            .index
            .search(&query, self.top_k)?
            .into_iter()
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }
}
