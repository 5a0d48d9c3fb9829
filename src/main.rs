use std::net::TcpListener;
use std::sync::Arc;

use auth_service::auth::TokenManager;
use auth_service::configuration::get_configuration;
use auth_service::notification::AlertClient;
use auth_service::origin::OriginPolicy;
use auth_service::startup::run;
use auth_service::store::PgSessionStore;
use auth_service::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(configuration.database.acquire_timeout())
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let http_client = reqwest::Client::builder()
        .timeout(configuration.notification.timeout())
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build notification client: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Notification client error")
        })?;
    let notifier = AlertClient::new(configuration.notification.base_url.clone(), http_client);

    let manager = TokenManager::new(
        &configuration.tokens,
        Arc::new(PgSessionStore::new(pool)),
        Arc::new(notifier),
        configuration.notification.timeout(),
    )
    .map_err(|e| {
        tracing::error!("Invalid token settings: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Token configuration error")
    })?;

    let origin_policy = OriginPolicy::from(&configuration.origin);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, manager, origin_policy)?;
    tracing::info!("Server started successfully");

    server.await
}
