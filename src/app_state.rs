use std::sync::Arc;

use crate::{config::AppConfig, rag::ChatOrchestrator};

/// Estado compartido de la aplicación. Los colaboradores (índice, modelos,
/// memoria) se construyen una vez al arrancar y viven dentro del orquestador.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
