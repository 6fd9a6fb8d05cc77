//! LiveChat API server entry point
//!
//! Loads configuration, picks the conversation store, and serves HTTP and
//! WebSocket traffic until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use livechat_api::{reply::OpenAiReplyGenerator, routes::create_router, AppState, Config};
use livechat_shared::{
    create_pool, run_migrations, ConversationStore, MemoryConversationStore, PgConversationStore,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine outside development
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    EnvFilter::new("livechat_api=info,livechat_shared=info,tower_http=info")
                }),
        )
        .with(fmt::layer().json())
        .try_init()
        .context("failed to initialize tracing")?;

    let config = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn ConversationStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "Using PostgreSQL conversation store"
            );
            Arc::new(PgConversationStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; conversations are kept in memory only");
            Arc::new(MemoryConversationStore::new())
        }
    };

    if config.reply.api_key.is_none() {
        tracing::warn!("REPLY_API_KEY not set; automated replies will use the fallback message");
    }
    let generator = OpenAiReplyGenerator::new(config.reply.clone())
        .context("failed to build reply client")?;

    let bind_address = config.bind_address.clone();
    let public_url = config.public_url.clone();
    let state = AppState::new(config, store, Arc::new(generator));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(
        address = %bind_address,
        public_url = %public_url,
        "Starting LiveChat API server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
