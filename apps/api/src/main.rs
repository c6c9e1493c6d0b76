//! Vitalshare API composition root.

#![forbid(unsafe_code)]

mod error;
mod extract;
mod handlers;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vitalshare_application::{
    ChangePublisher, ChangeSubscriber, NotificationService, SharingService,
};
use vitalshare_core::AppError;
use vitalshare_infrastructure::{
    InMemoryChangeStream, PostgresNotificationRepository, PostgresSharingRepository,
    PostgresUserDirectory, RedisChangeStream,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let frontend_url =
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);
    let realtime_backend =
        env::var("REALTIME_BACKEND").unwrap_or_else(|_| "memory".to_owned());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let (change_publisher, change_subscriber) = build_change_stream(&realtime_backend).await?;

    let sharing_repository = Arc::new(PostgresSharingRepository::new(pool.clone()));
    let notification_repository = Arc::new(PostgresNotificationRepository::new(pool.clone()));
    let user_directory = Arc::new(PostgresUserDirectory::new(pool));

    let notification_service = NotificationService::new(
        notification_repository,
        sharing_repository.clone(),
        user_directory.clone(),
        change_publisher.clone(),
    );
    let sharing_service = SharingService::new(
        sharing_repository,
        notification_service.clone(),
        user_directory,
        change_publisher,
    );

    let app_state = AppState {
        sharing_service,
        notification_service,
        change_subscriber,
    };

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/sharing/requests",
            post(handlers::sharing::create_request_handler),
        )
        .route(
            "/api/sharing/requests/sent",
            get(handlers::sharing::list_sent_requests_handler),
        )
        .route(
            "/api/sharing/requests/pending",
            get(handlers::sharing::list_pending_requests_handler),
        )
        .route(
            "/api/sharing/requests/{request_id}/accept",
            post(handlers::sharing::accept_request_handler),
        )
        .route(
            "/api/sharing/requests/{request_id}/decline",
            post(handlers::sharing::decline_request_handler),
        )
        .route(
            "/api/sharing/permissions/granted",
            get(handlers::sharing::list_granted_permissions_handler),
        )
        .route(
            "/api/sharing/permissions/received",
            get(handlers::sharing::list_received_permissions_handler),
        )
        .route(
            "/api/sharing/permissions/{viewer_id}",
            delete(handlers::sharing::revoke_access_handler),
        )
        .route(
            "/api/metrics/readings",
            post(handlers::metrics::record_metric_event_handler),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications_handler),
        )
        .route(
            "/api/notifications/{notification_id}/read",
            post(handlers::notifications::mark_notification_read_handler),
        )
        .route("/api/sync/events", get(handlers::sync::sync_events_handler))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let api_ip = IpAddr::from_str(api_host.as_str())
        .map_err(|error| AppError::Validation(format!("invalid API_HOST: {error}")))?;
    let address = SocketAddr::new(api_ip, api_port);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind {address}: {error}")))?;

    info!(%address, realtime_backend = %realtime_backend, "vitalshare-api started");

    axum::serve(listener, router)
        .await
        .map_err(|error| AppError::Internal(format!("server error: {error}")))
}

async fn build_change_stream(
    backend: &str,
) -> Result<(Arc<dyn ChangePublisher>, Arc<dyn ChangeSubscriber>), AppError> {
    match backend {
        "memory" => {
            let stream = Arc::new(InMemoryChangeStream::default());
            Ok((stream.clone(), stream))
        }
        "redis" => {
            let redis_url = required_env("REDIS_URL")?;
            let channel = env::var("REALTIME_CHANNEL")
                .unwrap_or_else(|_| "vitalshare:changes".to_owned());
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            let stream = Arc::new(RedisChangeStream::connect(client, channel).await?);
            Ok((stream.clone(), stream))
        }
        other => Err(AppError::Validation(format!(
            "REALTIME_BACKEND must be either 'memory' or 'redis', got '{other}'"
        ))),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
