use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use support_chatbot::{
    api,
    app_state::AppState,
    config::AppConfig,
    ingest,
    llm::{Embedder, LlmManager},
    memory::ConversationMemory,
    rag::ChatOrchestrator,
    vector_store::{SimilarityIndex, VectorRetriever},
};

/// Backend del chatbot de soporte.
#[derive(Parser, Debug)]
#[command(name = "support-chatbot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Arranca el servidor HTTP (comando por defecto).
    Serve,
    /// Trocea el documento fuente y crea o amplía el índice vectorial.
    BuildIndex {
        /// Documento a indexar (por defecto SOURCE_DOCUMENT_PATH).
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración y clientes del LLM
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let llm_manager = Arc::new(LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg, llm_manager).await,
        Command::BuildIndex { source } => {
            let summary = ingest::build_or_update_index(&cfg, llm_manager.as_ref(), source.as_deref())
                .await
                .context("Error construyendo el índice vectorial")?;
            info!("✅ {summary}");
            Ok(())
        }
    }
}

async fn serve(cfg: AppConfig, llm_manager: Arc<LlmManager>) -> Result<()> {
    // 3. Cargar el índice (sólo lectura durante toda la vida del proceso)
    let index = if SimilarityIndex::exists(&cfg.index_dir) {
        SimilarityIndex::load(&cfg.index_dir).context("Error cargando el índice vectorial")?
    } else {
        warn!(
            "No existe índice en {}; se responderá sin contexto. Ejecuta `build-index` primero.",
            cfg.index_dir.display()
        );
        SimilarityIndex::default()
    };

    // 4. Crear el orquestador y el estado compartido
    let embedder: Arc<dyn Embedder> = llm_manager.clone();
    let retriever = VectorRetriever::new(Arc::new(index), embedder, cfg.retrieval_top_k);
    let memory = ConversationMemory::new(cfg.max_sessions, cfg.max_turns_per_session);
    let orchestrator = ChatOrchestrator::new(Arc::new(retriever), llm_manager, Arc::new(memory));
    let app_state = AppState::new(cfg.clone(), orchestrator);

    // 5. Iniciar el servidor
    let app = api::create_router(app_state);
    let server_addr = cfg.server_addr();
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
