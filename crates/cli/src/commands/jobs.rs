//! Job queue inspection.

use orchard_api::db::JobRepository;

/// Log the most recent jobs that ran out of attempts.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn failed(limit: u32) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let jobs = JobRepository::new(pool).failed(limit).await?;

    if jobs.is_empty() {
        tracing::info!("No failed jobs");
        return Ok(());
    }

    tracing::info!("Failed jobs ({})", jobs.len());
    for (id, payload, error) in jobs {
        tracing::info!("  #{id}: {payload}");
        tracing::info!("      {error}");
    }
    Ok(())
}
