use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_registry::api::router;
use course_registry::config::AppConfig;
use course_registry::db;
use course_registry::session::SessionStore;
use course_registry::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_registry=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url, config.db_max_connections).await?;

    if config.run_migrations {
        db::migrate(&pool).await?;
    } else {
        warn!("migrations disabled; using the schema as found");
    }

    let tables = db::probe_tables(&pool).await?;

    let state = AppState {
        db: pool.clone(),
        tables,
        sessions: SessionStore::new(config.session_ttl_minutes),
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
