//! Construcción (o actualización) del índice vectorial a partir de un
//! documento de texto: lectura, troceado con solape, embeddings y
//! persistencia en disco.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    config::AppConfig,
    error::{ChatbotError, Result},
    llm::Embedder,
    models::DocumentChunk,
    vector_store::SimilarityIndex,
};

/// Separadores en orden de preferencia: párrafo, línea, palabra, carácter.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Resumen de los resultados de una construcción del índice.
#[derive(Debug)]
pub struct BuildSummary {
    pub source: PathBuf,
    pub chunks_added: usize,
    pub total_chunks: usize,
    pub updated_existing: bool,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} trozos añadidos desde {} ({} índice), {} trozos en total.",
            self.chunks_added,
            self.source.display(),
            if self.updated_existing { "actualizado" } else { "nuevo" },
            self.total_chunks
        )
    }
}

/// Divisor recursivo por caracteres con solape entre trozos consecutivos.
///
/// Prueba los separadores en orden; cualquier pieza que no quepa en
/// `chunk_size` se vuelve a dividir con el siguiente separador. Las
/// longitudes se miden en caracteres, no en bytes.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate) {
                separator = *candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }
        chunks
    }

    /// Une piezas pequeñas en trozos de hasta `chunk_size`, arrastrando al
    /// siguiente trozo como máximo `chunk_overlap` caracteres del anterior.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    warn!(
                        "Trozo de {total} caracteres, mayor que el tamaño configurado ({})",
                        self.chunk_size
                    );
                }
                if let Some(doc) = join_window(&window) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_window(&window) {
            docs.push(doc);
        }
        docs
    }
}

/// Divide `text` en cada aparición de `separator`, dejando el separador al
/// principio de la pieza siguiente. Con separador vacío, divide por carácter.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Lee el documento (UTF-8) y lo trocea según la política configurada.
pub fn load_and_split(path: &Path, splitter: &TextSplitter) -> Result<Vec<DocumentChunk>> {
    let text = fs::read_to_string(path).map_err(|source| ChatbotError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let source = path.to_string_lossy();
    Ok(splitter
        .split_text(&text)
        .into_iter()
        .map(|chunk| DocumentChunk::new(chunk, &source))
        .collect())
}

/// Construye el índice desde cero o añade los trozos del documento a uno
/// existente, y lo persiste en `cfg.index_dir`.
///
/// Es la única vía de escritura del índice; no admite ejecuciones
/// concurrentes.
pub async fn build_or_update_index(
    cfg: &AppConfig,
    embedder: &dyn Embedder,
    source_path: Option<&Path>,
) -> Result<BuildSummary> {
    let source = source_path.unwrap_or(cfg.source_document_path.as_path());
    info!("Cargando y troceando {}...", source.display());

    let splitter = TextSplitter::new(cfg.chunk_size, cfg.chunk_overlap);
    let chunks = load_and_split(source, &splitter)?;
    if chunks.is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", source.display());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed_documents(&texts).await?
    };

    let (mut index, updated_existing) = SimilarityIndex::load_or_new(&cfg.index_dir)?;
    if updated_existing {
        info!("Actualizando índice existente en {}...", cfg.index_dir.display());
    } else {
        info!("Creando índice nuevo en {}...", cfg.index_dir.display());
    }

    let chunks_added = chunks.len();
    index.add_chunks(chunks, embeddings)?;
    index.save(&cfg.index_dir)?;

    let summary = BuildSummary {
        source: source.to_path_buf(),
        chunks_added,
        total_chunks: index.len(),
        updated_existing,
    };
    info!("Índice guardado en {}. {}", cfg.index_dir.display(), summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f64, 1.0]).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
            Ok(vec![text.len() as f64, 1.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Err(ChatbotError::Embedding("servicio no disponible".into()))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f64>> {
            Err(ChatbotError::Embedding("servicio no disponible".into()))
        }
    }

    fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            index_dir: dir.join("vectorstore"),
            source_document_path: dir.join("data.txt"),
            chunk_size: 40,
            chunk_overlap: 10,
            ..AppConfig::default()
        }
    }

    #[test]
    fn words_are_merged_with_overlap() {
        let splitter = TextSplitter::new(10, 4);
        assert_eq!(
            splitter.split_text("aaa bbb ccc ddd"),
            vec!["aaa bbb", "bbb ccc", "ccc ddd"]
        );
    }

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        let splitter = TextSplitter::new(1000, 200);
        assert_eq!(
            splitter.split_text("  Primer párrafo.\n\nSegundo párrafo.\n"),
            vec!["Primer párrafo.\n\nSegundo párrafo."]
        );
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn text_without_separators_falls_back_to_characters() {
        let splitter = TextSplitter::new(5, 2);
        assert_eq!(
            splitter.split_text("abcdefghijkl"),
            vec!["abcde", "defgh", "ghijk", "jkl"]
        );
    }

    #[test]
    fn chunks_respect_size_in_characters() {
        let splitter = TextSplitter::new(50, 10);
        let text = "Análisis de datos y consultoría. ".repeat(40);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(split_keeping_separator("a\nb\nc", "\n"), vec!["a", "\nb", "\nc"]);
        assert_eq!(split_keeping_separator("\n\n\n\nX", "\n\n"), vec!["\n\n", "\n\nX"]);
        assert_eq!(split_keeping_separator("añb", ""), vec!["a", "ñ", "b"]);
    }

    #[tokio::test]
    async fn building_twice_appends_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        fs::write(
            &cfg.source_document_path,
            "Ofrecemos consultoría de datos.\n\nHorario de lunes a viernes.\n\nReserva una cita.",
        )
        .unwrap();

        let first = build_or_update_index(&cfg, &LengthEmbedder, None).await.unwrap();
        assert!(!first.updated_existing);
        assert!(first.chunks_added > 0);
        assert_eq!(first.total_chunks, first.chunks_added);

        let second = build_or_update_index(&cfg, &LengthEmbedder, None).await.unwrap();
        assert!(second.updated_existing);
        assert!(second.total_chunks >= first.total_chunks);
        assert_eq!(second.total_chunks, first.total_chunks * 2);

        let stored = SimilarityIndex::load(&cfg.index_dir).unwrap();
        assert_eq!(stored.len(), second.total_chunks);
    }

    #[tokio::test]
    async fn explicit_source_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let other = dir.path().join("otro.txt");
        fs::write(&other, "Contenido alternativo.").unwrap();

        let summary = build_or_update_index(&cfg, &LengthEmbedder, Some(other.as_path()))
            .await
            .unwrap();
        assert_eq!(summary.source, other);

        let stored = SimilarityIndex::load(&cfg.index_dir).unwrap();
        let expected = other.to_string_lossy().into_owned();
        assert_eq!(stored.chunks[0].chunk.source(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn missing_source_is_a_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let err = build_or_update_index(&cfg, &LengthEmbedder, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatbotError::FileAccess { .. }));
        assert!(!SimilarityIndex::exists(&cfg.index_dir));
    }

    #[tokio::test]
    async fn non_utf8_source_is_a_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        fs::write(&cfg.source_document_path, [0xff, 0xfe, 0x41]).unwrap();

        let err = build_or_update_index(&cfg, &LengthEmbedder, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatbotError::FileAccess { ref source, .. }
                if source.kind() == std::io::ErrorKind::InvalidData
        ));
        assert!(!SimilarityIndex::exists(&cfg.index_dir));
    }

    #[tokio::test]
    async fn embedding_failure_leaves_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        fs::write(&cfg.source_document_path, "Texto a indexar.").unwrap();

        let err = build_or_update_index(&cfg, &FailingEmbedder, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatbotError::Embedding(_)));
        assert!(!SimilarityIndex::exists(&cfg.index_dir));
    }
}
