// src/main.rs - BloodLink backend: wiring, route table and startup
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use actix_web_httpauth::middleware::HttpAuthentication;
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteConnectOptions, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod auth;
mod auth_handlers;
mod blood_request_handlers;
mod config;
mod db;
mod emergency_handlers;
mod error;
mod handlers;
mod hub;
mod models;
mod monitoring;
mod notify;
mod patient_handlers;
mod preservation_handlers;
mod send_record_handlers;
pub mod validator;

use auth::{jwt_middleware, AuthService};
use auth_handlers::{get_profile, login, register};
use blood_request_handlers::{
    accept_blood_request, cancel_blood_request, create_blood_request, fulfill_blood_request,
    get_my_blood_requests, get_open_blood_requests, respond_to_blood_request,
};
use config::{load_config, Config};
use emergency_handlers::{
    cancel_emergency, create_emergency, get_latest_emergencies, get_my_emergencies,
    get_my_pledges, get_nearby_emergencies, respond_to_emergency,
};
use handlers::get_dashboard_stats;
use hub::BroadcastHub;
use monitoring::{Metrics, RequestLogger};
use notify::{LogSink, NotificationSink};
use patient_handlers::{create_patient, get_patients, record_received_units};
use preservation_handlers::{
    create_preservation, get_near_expiry_preservations, get_preservation, get_preservations,
};
use send_record_handlers::{
    dispatch, get_bank_stats, get_send_records, update_send_record_status,
};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub hub: Arc<BroadcastHub>,
    pub notifier: Arc<dyn NotificationSink>,
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config::is_production() {
        config::validate_production_config(&config)?;
    }

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
        config.auth.bcrypt_cost,
    ));
    let hub = Arc::new(BroadcastHub::new());
    let notifier: Arc<dyn NotificationSink> = Arc::new(LogSink);

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        hub,
        notifier,
    });

    let metrics_arc = Arc::new(Metrics::new());

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let workers = config.server.workers;
    log::info!("Starting server at http://{}", bind_address);

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins);
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(metrics_arc.clone()))
            // Health check and metrics (no auth)
            .service(
                web::scope("/health")
                    .route("", web::get().to(monitoring::health_check))
                    .route("/ready", web::get().to(monitoring::readiness_check))
                    .route("/live", web::get().to(monitoring::liveness_check))
                    .route("/metrics", web::get().to(monitoring::metrics_endpoint)),
            )
            // Auth endpoints (no authentication required)
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login)),
            )
            // Realtime hub; rooms are joined via the in-band handshake
            .route("/ws", web::get().to(hub::ws_endpoint))
            // Public listing
            .service(
                web::scope("/api/v1/emergencies")
                    .route("/latest", web::get().to(get_latest_emergencies)),
            )
            // Protected API endpoints
            .service(
                web::scope("/api/v1")
                    .wrap(auth_middleware)
                    .service(
                        web::scope("/auth").route("/profile", web::get().to(get_profile)),
                    )
                    .service(
                        web::scope("/dashboard")
                            .route("/stats", web::get().to(get_dashboard_stats)),
                    )
                    .service(
                        web::scope("/hospital")
                            .route("/emergency", web::post().to(create_emergency))
                            .route("/emergency/{id}/cancel", web::put().to(cancel_emergency))
                            .route("/emergencies", web::get().to(get_my_emergencies))
                            .route("/patients", web::post().to(create_patient))
                            .route("/patients", web::get().to(get_patients))
                            .route(
                                "/patients/{id}/received",
                                web::put().to(record_received_units),
                            ),
                    )
                    .service(
                        web::scope("/bloodbank")
                            .route("/emergency", web::post().to(create_emergency))
                            .route("/emergency/{id}/cancel", web::put().to(cancel_emergency))
                            .route("/emergencies", web::get().to(get_my_emergencies))
                            .route("/blood-requests", web::get().to(get_open_blood_requests))
                            .route(
                                "/blood-requests/{id}/accept",
                                web::post().to(accept_blood_request),
                            )
                            .route(
                                "/blood-requests/{id}/respond",
                                web::post().to(respond_to_blood_request),
                            )
                            .route(
                                "/blood-requests/{id}/fulfill",
                                web::put().to(fulfill_blood_request),
                            )
                            .route("/preservation", web::post().to(create_preservation))
                            .route("/preservation", web::get().to(get_preservations))
                            .route(
                                "/preservation/near-expiry",
                                web::get().to(get_near_expiry_preservations),
                            )
                            .route("/preservation/{id}", web::get().to(get_preservation))
                            .route("/dispatch", web::post().to(dispatch))
                            .route("/send-records", web::get().to(get_send_records))
                            .route(
                                "/send-records/{id}",
                                web::patch().to(update_send_record_status),
                            )
                            .route("/stats", web::get().to(get_bank_stats)),
                    )
                    .service(
                        web::scope("/donor")
                            .route("/respond", web::post().to(respond_to_emergency))
                            .route(
                                "/nearby-emergencies",
                                web::get().to(get_nearby_emergencies),
                            )
                            .route("/pledges", web::get().to(get_my_pledges)),
                    )
                    .service(
                        web::scope("/patient")
                            .route("/blood-request", web::post().to(create_blood_request))
                            .route("/blood-requests", web::get().to(get_my_blood_requests))
                            .route(
                                "/blood-request/{id}/cancel",
                                web::put().to(cancel_blood_request),
                            ),
                    ),
            )
    });

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await?;
    Ok(())
}

// ==================== SETUP HELPERS ====================

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let filename = db_config
        .url
        .strip_prefix("sqlite:")
        .unwrap_or(&db_config.url);
    let options = SqliteConnectOptions::new()
        .filename(filename)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(db_config.connect_timeout))
        .connect_with(options)
        .await?;
    Ok(pool)
}

fn setup_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600);

    if allowed_origins.contains(&"*".to_string()) {
        // Rejected earlier for production; convenient for local development
        log::warn!("Using wildcard CORS origins");
        cors = cors.allow_any_origin();
    } else {
        for origin in allowed_origins {
            if !origin.is_empty() {
                cors = cors.allowed_origin(origin);
            }
        }
    }

    cors
}

fn setup_security_headers(config: &config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains",
        ));
    }

    headers
}
