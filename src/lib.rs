//! Backend de un chatbot de soporte: recupera pasajes de un índice vectorial
//! local y pide a un LLM alojado una respuesta en HTML, recordando el
//! historial de cada sesión.

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod models;
pub mod rag;
pub mod vector_store;
