use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Utc;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::{AuthService, Role, SessionStore};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, change_user_role, delete_account, get_profile, health_check, list_users,
    login, logout, refresh, register, update_profile,
};

/// Malformed or incomplete JSON bodies become 400 `VALIDATION_ERROR`s
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(ValidationError::InvalidFormat(format!("request body ({})", err)))
            .into()
    })
}

pub fn run(listener: TcpListener, auth: Arc<AuthService>) -> Result<Server, std::io::Error> {
    let auth = web::Data::from(auth);

    let server = HttpServer::new(move || {
        let gate = auth.gate().clone();

        App::new()
            // Global middleware
            .wrap(LoggerMiddleware)
            .wrap(Logger::default())
            // Shared state
            .app_data(auth.clone())
            .app_data(json_config())
            .service(
                web::scope("/api/v1")
                    // Public routes
                    .route("/health", web::get().to(health_check))
                    .service(
                        web::scope("/auth")
                            .route("/register", web::post().to(register))
                            .route("/login", web::post().to(login))
                            .route("/refresh", web::post().to(refresh))
                            .service(
                                web::resource("/logout")
                                    .wrap(JwtMiddleware::new(gate.clone()))
                                    .route(web::post().to(logout)),
                            ),
                    )
                    // Authenticated routes
                    .service(
                        web::scope("/users")
                            .wrap(JwtMiddleware::new(gate.clone()))
                            .route("/profile", web::get().to(get_profile))
                            .route("/profile", web::put().to(update_profile))
                            .route("/change-password", web::put().to(change_password))
                            .route("/account", web::delete().to(delete_account)),
                    )
                    // Admin routes
                    .service(
                        web::scope("/admin")
                            .wrap(JwtMiddleware::new(gate).require(&[Role::Admin]))
                            .route("/users", web::get().to(list_users))
                            .route("/users/{id}/role", web::put().to(change_user_role)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Periodically delete expired refresh sessions
pub fn spawn_session_reaper(sessions: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sessions.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged = purged, "Expired refresh sessions removed"),
                Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
            }
        }
    })
}
