use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use user_accounts::accounts::PgAccountStore;
use user_accounts::auth::{AuthService, PgSessionStore, SessionStore};
use user_accounts::configuration::get_configuration;
use user_accounts::startup::{run, spawn_session_reaper};
use user_accounts::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, what: &str, e: impl std::fmt::Display) -> std::io::Error {
    tracing::error!(error = %e, "{}", what);
    std::io::Error::new(kind, format!("{}: {}", what, e))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            init_telemetry("info");
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Failed to read configuration",
                e,
            ));
        }
    };

    init_telemetry(&configuration.log.level);
    tracing::info!("Configuration loaded successfully");

    let db_timeout = configuration.database.timeout();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(db_timeout)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Failed to create connection pool",
                e,
            )
        })?;
    tracing::info!("Database connection pool created successfully");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| startup_error(std::io::ErrorKind::Other, "Failed to run migrations", e))?;
    tracing::info!("Database migrations applied");

    let accounts = Arc::new(PgAccountStore::new(pool.clone()).with_timeout(db_timeout));
    let sessions: Arc<dyn SessionStore> =
        Arc::new(PgSessionStore::new(pool).with_timeout(db_timeout));

    let auth = AuthService::new(configuration.jwt.clone(), accounts, sessions.clone())
        .map_err(|e| {
            startup_error(std::io::ErrorKind::InvalidInput, "Failed to build auth service", e)
        })?;

    spawn_session_reaper(
        sessions,
        Duration::from_secs(configuration.application.session_cleanup_interval_seconds),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, Arc::new(auth))?.await
}
