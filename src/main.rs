use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use clinicbot::config::AppConfig;
use clinicbot::db;
use clinicbot::handlers;
use clinicbot::services::ai::gemini::GeminiProvider;
use clinicbot::services::ai::ollama::OllamaProvider;
use clinicbot::services::ai::LlmProvider;
use clinicbot::services::dialogue::TurnLocks;
use clinicbot::services::memory::ConversationMemory;
use clinicbot::services::messaging::telegram::TelegramProvider;
use clinicbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    if config.seed_demo_data {
        db::schema::seed_demo_data(&conn)?;
        tracing::info!("demo fixtures seeded");
    }

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))
        }
        _ => {
            anyhow::ensure!(
                !config.gemini_api_key.is_empty(),
                "GEMINI_API_KEY must be set when LLM_PROVIDER=gemini"
            );
            tracing::info!("using Gemini LLM provider (model: {})", config.gemini_model);
            Box::new(GeminiProvider::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
            ))
        }
    };

    if config.telegram_bot_token.is_empty() {
        tracing::warn!("TELEGRAM_BOT_TOKEN not set, outbound telegram delivery disabled");
    }
    let messaging = TelegramProvider::new(config.telegram_bot_token.clone());

    let memory_ttl = Duration::from_secs(config.memory_ttl_minutes * 60);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        llm,
        messaging: Box::new(messaging),
        memory: ConversationMemory::new(memory_ttl),
        turns: TurnLocks::new(),
    });

    // Periodic eviction of abandoned pending states and idle turn locks.
    let sweeper_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let dropped_states = sweeper_state.memory.sweep();
            let dropped_locks = sweeper_state.turns.sweep();
            if dropped_states > 0 || dropped_locks > 0 {
                tracing::debug!(
                    dropped_states,
                    dropped_locks,
                    "expired conversation data swept"
                );
            }
        }
    });

    let app = Router::new()
        .route("/", get(handlers::health::health))
        .route("/health", get(handlers::health::health))
        .route("/webhook/telegram", post(handlers::webhook::telegram_webhook))
        .route("/chat", post(handlers::chat::chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
