use anyhow::Context;

use herald::config::DispatchConfig;
use herald::functions::dispatch_tick;
use herald::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = DispatchConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    let store = PgStore::new(pool);
    let summary = dispatch_tick(&store, &config, chrono::Utc::now()).await?;

    tracing::info!(
        queued = summary.queued,
        due = summary.due,
        processed = summary.processed,
        delivered = summary.delivered,
        failed = summary.failed,
        skipped = summary.skipped,
        "dispatch run complete"
    );

    Ok(())
}
