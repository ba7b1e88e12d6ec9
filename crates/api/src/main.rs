//! Orchard API - Shop backend.
//!
//! This binary serves the JSON API on port 3000 and, unless
//! `ORCHARD_WORKER_ENABLED=false`, runs the background job runner in the
//! same process.
//!
//! # Architecture
//!
//! - Axum web framework, JSON envelope responses
//! - `PostgreSQL` for products, orders, notifications and the job queue
//! - SMTP (or log-only) mail for notices and password reset links
//!
//! Migrations are NOT run on startup. Run them with `orchard migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use tokio::sync::watch;

use orchard_api::config::ApiConfig;
use orchard_api::db::{self, JobRepository};
use orchard_api::services::queue::{JobRunner, TaskHandler};
use orchard_api::services::mailer_from_config;
use orchard_api::state::AppState;
use orchard_api::store::Stores;
use orchard_api::telemetry;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ApiConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = telemetry::init_sentry(&config.sentry);

    telemetry::init_tracing("orchard_api=info,tower_http=debug", config.json_logs);

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let mailer = mailer_from_config(config.email.as_ref()).expect("Failed to configure SMTP");

    let stores = Stores::postgres(&pool);
    let state = AppState::new(&stores, mailer.clone(), &config.base_url, Some(pool.clone()));

    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = config.worker.enabled.then(|| {
        let runner = JobRunner::new(
            Arc::new(JobRepository::new(pool.clone())),
            TaskHandler::from_stores(&stores, mailer.clone(), &config.base_url),
            config.worker.poll_interval,
            config.worker.batch_size,
        );
        let mut stop = stop_rx.clone();
        tokio::spawn(runner.run(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        }))
    });

    let addr = config.socket_addr();
    tracing::info!("orchard-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, orchard_api::app(state))
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .expect("Server error");

    let _ = stop_tx.send(true);
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Job runner task failed");
        }
    }
}
