use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::configuration::JwtSettings;
use crate::logger::RequestLogger;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_current_user, health_check, login, refresh_token, register, revoke_token};
use crate::session::SessionManager;
use crate::store::TokenStore;

pub fn run(
    listener: TcpListener,
    store: Arc<dyn TokenStore>,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let session_manager = web::Data::new(SessionManager::new(store, jwt_config.clone()));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(session_manager.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh-token", web::post().to(refresh_token))
            .route("/auth/revoke-token", web::post().to(revoke_token))
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/me", web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
