//! Subcommand implementations.

pub mod jobs;
pub mod migrate;
pub mod seed;
pub mod user;
pub mod worker;

use orchard_api::config::get_database_url;
use orchard_api::db;
use sqlx::PgPool;

/// Connect to the database named by `ORCHARD_DATABASE_URL` or `DATABASE_URL`.
async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = get_database_url("ORCHARD_DATABASE_URL")?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}
