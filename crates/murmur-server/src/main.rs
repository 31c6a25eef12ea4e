use tracing::info;

use murmur_db::Database;
use murmur_server::{ServerConfig, build_gateway, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = if config.in_memory_db() {
        info!("Using in-memory database; messages will not survive a restart");
        Database::open_in_memory()?
    } else {
        Database::open(&config.db_path)?
    };

    let app = router(build_gateway(db, &config.jwt_secret));

    let listener = tokio::net::TcpListener::bind(config.bind_target()).await?;
    info!("Murmur server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
