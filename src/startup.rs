use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::TokenManager;
use crate::middleware::JwtMiddleware;
use crate::origin::OriginPolicy;
use crate::routes::{authenticate, current_session, health_check, refresh};

pub fn run(
    listener: TcpListener,
    manager: TokenManager,
    origin_policy: OriginPolicy,
) -> Result<Server, std::io::Error> {
    let codec = manager.codec().clone();
    let manager = web::Data::new(manager);
    let origin_policy = web::Data::new(origin_policy);

    let server = HttpServer::new(move || {
        App::new()
            // Request logs flow into the tracing subscriber
            .wrap(Logger::default())

            // Shared state
            .app_data(manager.clone())
            .app_data(origin_policy.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/v1/auth", web::post().to(authenticate))
            .route("/v1/refresh", web::post().to(refresh))

            // Protected routes (require a live access token)
            .service(
                web::scope("/v1/me")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route("", web::get().to(current_session)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
