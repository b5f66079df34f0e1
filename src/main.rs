use ficha_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router, db,
    repository::{PostgresRepository, RepositoryState},
};
use std::{process, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database (with retry), schema bootstrap, legacy
/// list migration, seed data, then the HTTP server. Any failure before serving aborts the
/// process.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail fast, no credential defaults)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            process::exit(1);
        }
    };

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ficha_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = match db::connect_with_retry(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("FATAL: {}. Check DATABASE_URL.", e);
            process::exit(1);
        }
    };

    // 4. Schema, legacy data, seed
    if let Err(e) = db::bootstrap_schema(&pool).await {
        tracing::error!("FATAL: schema bootstrap failed: {}", e);
        process::exit(1);
    }
    if let Err(e) = db::migrate_legacy_lists(&pool).await {
        tracing::error!("FATAL: legacy list migration failed: {}", e);
        process::exit(1);
    }
    if let Err(e) = db::seed(&pool, &config).await {
        tracing::error!("FATAL: seeding failed: {}", e);
        process::exit(1);
    }

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("FATAL: cannot bind {}: {}", bind_addr, e);
            process::exit(1);
        }
    };

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        process::exit(1);
    }
}
