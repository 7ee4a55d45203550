use std::path::Path;

use anyhow::Context;
use timebank::{auth::Clients, db, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let db_pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    db::run_migrations(&db_pool).await?;

    let clients = if Path::new(&config.client_secret_path).exists() {
        let raw = std::fs::read_to_string(&config.client_secret_path)
            .with_context(|| format!("reading {}", config.client_secret_path))?;
        Clients::from_json(serde_json::from_str(&raw)?, &config).map_err(|e| e.error)?
    } else {
        tracing::warn!(path = %config.client_secret_path, "no client secret file, login is disabled");
        Clients::empty()
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on {} ({})", config.listen_addr, config.public_url);

    let app = timebank::app(AppState::new(db_pool, clients, config));
    axum::serve(listener, app).await?;
    Ok(())
}
