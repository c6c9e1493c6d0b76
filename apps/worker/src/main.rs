//! Vitalshare notification delivery worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vitalshare_application::{DeliveryConfig, DeliveryService, NotificationSink};
use vitalshare_core::{AppError, AppResult};
use vitalshare_infrastructure::{
    ConsoleNotificationSink, HttpPushSink, HttpPushSinkConfig, PostgresNotificationRepository,
};

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    sink_provider: String,
    push_endpoint: Option<String>,
    push_auth_token: Option<String>,
    claim_limit: usize,
    sink_timeout_ms: u64,
    visibility_timeout_ms: u64,
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let delivery_service = build_delivery_service(pool, &config)?;

    info!(
        sink_provider = %config.sink_provider,
        claim_limit = config.claim_limit,
        sink_timeout_ms = config.sink_timeout_ms,
        visibility_timeout_ms = config.visibility_timeout_ms,
        poll_interval_ms = config.poll_interval_ms,
        "vitalshare-worker started"
    );

    loop {
        match delivery_service.run_once().await {
            Ok(outcome) => {
                if outcome.claimed > 0 {
                    info!(
                        claimed = outcome.claimed,
                        sent = outcome.sent,
                        retried = outcome.retried,
                        failed = outcome.failed,
                        "processed delivery batch"
                    );
                    // Keep draining while the queue has work.
                    if outcome.claimed == config.claim_limit {
                        continue;
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to process delivery batch");
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_delivery_service(pool: PgPool, config: &WorkerConfig) -> AppResult<DeliveryService> {
    let repository = Arc::new(PostgresNotificationRepository::new(pool));
    let sink = build_sink(config)?;

    DeliveryService::new(
        repository,
        sink,
        DeliveryConfig {
            claim_limit: config.claim_limit,
            sink_timeout: Duration::from_millis(config.sink_timeout_ms),
            visibility_timeout: Duration::from_millis(config.visibility_timeout_ms),
            ..DeliveryConfig::default()
        },
    )
}

fn build_sink(config: &WorkerConfig) -> AppResult<Arc<dyn NotificationSink>> {
    match config.sink_provider.as_str() {
        "console" => Ok(Arc::new(ConsoleNotificationSink::new())),
        "push" => {
            let endpoint = config.push_endpoint.clone().ok_or_else(|| {
                AppError::Validation(
                    "PUSH_RELAY_ENDPOINT is required when NOTIFICATION_SINK_PROVIDER=push"
                        .to_owned(),
                )
            })?;
            let auth_token = config.push_auth_token.clone().ok_or_else(|| {
                AppError::Validation(
                    "PUSH_RELAY_AUTH_TOKEN is required when NOTIFICATION_SINK_PROVIDER=push"
                        .to_owned(),
                )
            })?;
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.sink_timeout_ms))
                .build()
                .map_err(|error| {
                    AppError::Internal(format!("failed to build HTTP client: {error}"))
                })?;

            Ok(Arc::new(HttpPushSink::new(
                http_client,
                HttpPushSinkConfig {
                    endpoint,
                    auth_token,
                },
            )))
        }
        other => Err(AppError::Validation(format!(
            "unknown NOTIFICATION_SINK_PROVIDER '{other}', expected 'console' or 'push'"
        ))),
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let sink_provider = env::var("NOTIFICATION_SINK_PROVIDER")
            .unwrap_or_else(|_| "console".to_owned())
            .trim()
            .to_lowercase();
        let push_endpoint = optional_env("PUSH_RELAY_ENDPOINT");
        let push_auth_token = optional_env("PUSH_RELAY_AUTH_TOKEN");
        let claim_limit = parse_env_usize("WORKER_CLAIM_LIMIT", 25)?;
        let sink_timeout_ms = parse_env_u64("WORKER_SINK_TIMEOUT_MS", 10_000)?;
        let visibility_timeout_ms = parse_env_u64("WORKER_VISIBILITY_TIMEOUT_MS", 60_000)?;
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 1500)?;

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if sink_timeout_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_SINK_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }

        if visibility_timeout_ms <= sink_timeout_ms {
            return Err(AppError::Validation(
                "WORKER_VISIBILITY_TIMEOUT_MS must exceed WORKER_SINK_TIMEOUT_MS".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            sink_provider,
            push_endpoint,
            push_auth_token,
            claim_limit,
            sink_timeout_ms,
            visibility_timeout_ms,
            poll_interval_ms,
        })
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

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
