//! # Taskmate API Server
//!
//! Serves task CRUD, authentication and the streaming task assistant.
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/taskmate cargo run -p taskmate-api
//! ```

use std::sync::Arc;
use taskmate_api::{
    app::{build_router, AppState},
    assistant::openai::OpenAiChatModel,
    config::Config,
};
use taskmate_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    email::{EmailSender, HttpEmailSender, LogEmailSender},
    redis::client::{sanitize_url, RedisClient, RedisConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskmate_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Taskmate API v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        max_connections: config.database.max_connections,
        ..DatabaseConfig::from_url(&config.database.url)
    })
    .await?;
    run_migrations(&pool).await?;

    let email: Arc<dyn EmailSender> = match (&config.email.api_url, &config.email.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpEmailSender::new(url, key, &config.email.from)?),
        (Some(_), None) => anyhow::bail!("EMAIL_API_KEY is required when EMAIL_API_URL is set"),
        _ => {
            tracing::warn!("EMAIL_API_URL not set, emails will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    let redis = match &config.redis.url {
        Some(url) => {
            let client = RedisClient::new(RedisConfig::from_url(url)).await?;
            tracing::info!(url = %sanitize_url(url), "Chat rate limiting enabled");
            Some(client)
        }
        None => {
            tracing::warn!("REDIS_URL not set, chat rate limiting disabled");
            None
        }
    };

    let model = match &config.llm.api_key {
        Some(key) => Some(OpenAiChatModel::new(&config.llm.api_url, key, &config.llm.model)?),
        None => {
            tracing::warn!("LLM_API_KEY not set, chat completions will return 503");
            None
        }
    };

    let bind_address = config.bind_address();
    let mut state = AppState::new(pool, config).with_email(email);
    if let Some(redis) = redis {
        state = state.with_redis(redis);
    }
    if let Some(model) = model {
        state = state.with_model(Arc::new(model));
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
