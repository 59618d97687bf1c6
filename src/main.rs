use session_auth_service::{
    build_router,
    config::AuthConfig,
    db,
    error::AppError,
    observability::init_tracing,
    services::{Authenticator, CookiePolicy, IdentityProvider, OidcProvider, PgUserStore, UserStore},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting session authentication service"
    );

    // Initialize the database connection and prove it usable before serving
    tracing::info!("Initializing database connection");
    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::health_check(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    tracing::info!("Database initialized successfully");

    let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));

    let cookies = CookiePolicy::new(&config.cookies);
    if cookies.is_local_domain() {
        tracing::info!(domain = %config.cookies.domain, "Local cookie domain: secure cookies and the upgrade-insecure-requests hint are disabled");
    }

    // Resolve provider endpoints eagerly - fail fast if unreachable
    let provider: Arc<dyn IdentityProvider> = Arc::new(
        OidcProvider::discover(&config.provider, !cookies.is_local_domain())
            .await
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("provider discovery failed: {e}")))?,
    );
    tracing::info!("Identity provider client initialized");

    let authenticator = Authenticator::new(provider.clone(), store.clone());

    let state = AppState {
        config: config.clone(),
        store,
        provider,
        authenticator,
        cookies,
    };

    // Build application router
    let app = build_router(state).await?;

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
