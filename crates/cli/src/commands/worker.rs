//! Background worker command.
//!
//! Runs the job runner on its own, for deployments that set
//! `ORCHARD_WORKER_ENABLED=false` on the API processes. Reads the same
//! environment as the API binary.

use std::sync::Arc;

use orchard_api::config::ApiConfig;
use orchard_api::db::{self, JobRepository};
use orchard_api::services::mailer_from_config;
use orchard_api::services::queue::{JobRunner, TaskHandler};
use orchard_api::store::Stores;
use orchard_api::telemetry;

/// Run jobs until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if configuration, the database or SMTP setup fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ApiConfig::from_env()?;

    let _sentry_guard = telemetry::init_sentry(&config.sentry);
    telemetry::init_tracing("orchard_api=info,orchard_cli=info", config.json_logs);

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    let mailer = mailer_from_config(config.email.as_ref())?;
    let stores = Stores::postgres(&pool);

    let runner = JobRunner::new(
        Arc::new(JobRepository::new(pool)),
        TaskHandler::from_stores(&stores, mailer, &config.base_url),
        config.worker.poll_interval,
        config.worker.batch_size,
    );
    runner.run(telemetry::shutdown_signal()).await;

    Ok(())
}
