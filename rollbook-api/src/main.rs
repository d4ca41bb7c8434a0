//! rollbook-api - School attendance service
//!
//! HTTP service for student records, daily attendance marking, aggregate
//! statistics, and a natural-language chat assistant over the data.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use rollbook_api::config::{Args, Config};
use rollbook_api::services::llm::LlmClient;
use rollbook_api::services::translator::QueryTranslator;
use rollbook_api::{build_router, db, AppState};
use rollbook_common::config::load_toml_config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting Rollbook attendance service (rollbook-api) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();
    let toml_config = load_toml_config()?;
    let config = Config::resolve(args, &toml_config);

    info!("Database path: {}", config.database_path.display());

    let pool = match db::init_database_pool(&config.database_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e);
        }
    };

    db::init_tables(&pool).await?;
    info!("✓ Database schema ready");

    let translator = match &config.groq_api_key {
        Some(key) => match LlmClient::new(key.clone()) {
            Ok(client) => {
                info!("✓ Chat assistant enabled");
                Some(QueryTranslator::new(client))
            }
            Err(e) => {
                warn!("Chat assistant disabled: {}", e);
                None
            }
        },
        None => {
            warn!("No chat credential configured; /api/chat will report the feature as unavailable");
            None
        }
    };

    let state = AppState::new(pool, translator);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("rollbook-api listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
