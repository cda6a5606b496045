/// Game Data Fetcher
///
/// An ETL pipeline for fetching, normalizing, and loading RAWG video-game metadata.
mod api;
mod cli;
mod db;
mod etl;
mod models;
mod pipeline;

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use api::{GamesQuery, RawgClient, DEFAULT_BASE_URL};
use clap::Parser;
use cli::{Cli, Command};
use db::{Database, SnapshotArchive};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    cli.validate()?;

    println!("🎮 Starting Game Data Fetcher...");

    match &cli.command {
        Command::Fetch { page_size, dates } => {
            let client = connect_api(&cli).await?;
            let query = GamesQuery { page_size: *page_size, dates: dates.clone() };

            etl::extract::run_fetch_pass(&client, &query, cli.pacing(), &cli.retry_policy(), &cli.raw_dir()).await?;
        }

        Command::Details { ids, cooldown, table, batch_size } => {
            let client = connect_api(&cli).await?;

            let ids = if ids.is_empty() {
                // No explicit ids: the current table contents are the target list.
                let database = connect_database(&cli).await?;
                let rows = etl::load::pull_all_games(database.pool(), table, *batch_size).await?;
                println!("📚 Pulled {} game ids from {}", rows.len(), table);
                rows.iter().map(|r| r.game_id).collect()
            } else {
                ids.clone()
            };

            etl::extract::run_detail_pass(
                &client,
                &ids,
                cli.pacing(),
                Duration::from_secs(*cooldown),
                &cli.retry_policy(),
                &cli.detail_dir(),
            )
            .await?;
        }

        Command::Clean => {
            let raw_path = etl::extract::latest_raw_file(&cli.raw_dir())?;
            println!("📂 Latest raw checkpoint: {}", raw_path.display());

            let records = etl::extract::read_raw_records(&raw_path)?;
            let (rows, stats) = etl::transform::normalize_records(&records, chrono::Utc::now());
            println!(
                "🧹 Normalized {} of {} records ({} dropped for missing id)",
                stats.rows_out, stats.records_in, stats.missing_id
            );

            let snapshot_path = etl::snapshot::write_snapshot(&rows, &cli.snapshot_dir())?;
            println!("🗂️  Snapshot: {}", snapshot_path.display());
        }

        Command::Upsert { table, archive } => {
            let snapshot_path = etl::snapshot::latest_snapshot(&cli.snapshot_dir())?;
            println!("🗂️  Promoting snapshot: {}", snapshot_path.display());

            let rows = etl::snapshot::read_snapshot(&snapshot_path)?;
            let database = connect_database(&cli).await?;

            if *archive {
                snapshot_archive()?.upload(&snapshot_path).await?;
            }

            let upserted = etl::load::upsert_games(database.pool(), table, &rows).await?;
            let total = database.row_count(table).await?;
            println!("💾 Upserted {} rows; {} now holds {} rows", upserted, table, total);
        }

        Command::Pull { table, batch_size } => {
            let database = connect_database(&cli).await?;
            let rows = etl::load::pull_all_games(database.pool(), table, *batch_size).await?;
            println!("📚 Pulled {} rows from {}", rows.len(), table);
        }

        Command::Run { page_size, dates, table, archive } => {
            let client = connect_api(&cli).await?;
            let database = connect_database(&cli).await?;
            let archive = if *archive { Some(snapshot_archive()?) } else { None };

            let config = pipeline::PipelineConfig {
                query: GamesQuery { page_size: *page_size, dates: dates.clone() },
                pacing: cli.pacing(),
                retry: cli.retry_policy(),
                table: table.clone(),
                raw_dir: cli.raw_dir(),
                snapshot_dir: cli.snapshot_dir(),
            };

            let pipeline = pipeline::Pipeline::new(client, database, archive, config);
            pipeline.run().await.context("Pipeline execution failed")?;
        }
    }

    println!("\n✨ Done!");

    Ok(())
}

/// Build the API client and verify the endpoint is reachable
async fn connect_api(cli: &Cli) -> Result<RawgClient> {
    let api_key = match &cli.api_key {
        Some(key) => key.clone(),
        None => {
            env::var("RAWG_API_KEY").context("RAWG_API_KEY not found in environment. Please check your .env file")?
        }
    };
    let base_url = cli.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let client = RawgClient::new(base_url, api_key).context("Failed to create API client")?;

    let info = client.test_connection().await.context("Failed to connect to the RAWG API")?;
    println!("✅ Connected to: {}", info.endpoint);
    if let Some(total) = info.total_count {
        println!("🎯 Games in catalog: {}", format_number(total));
    }

    Ok(client)
}

/// Connect to the database, verify the connection, and run migrations
async fn connect_database(cli: &Cli) -> Result<Database> {
    let database_url = match &cli.database_url {
        Some(url) => url.clone(),
        None => {
            env::var("DATABASE_URL").context("DATABASE_URL not found in environment. Please check your .env file")?
        }
    };

    println!("\n💾 Connecting to PostgreSQL database...");
    let database = Database::new(&database_url).await.context("Failed to connect to PostgreSQL database")?;

    database.test_connection().await.context("Database connection test failed")?;
    database.migrate().await.context("Failed to run database migrations")?;

    println!("✅ Database ready!");
    Ok(database)
}

/// Build the blob-store client from environment variables
fn snapshot_archive() -> Result<SnapshotArchive> {
    let base_url =
        env::var("SUPABASE_URL").context("SUPABASE_URL not found in environment. Please check your .env file")?;
    let api_key =
        env::var("SUPABASE_KEY").context("SUPABASE_KEY not found in environment. Please check your .env file")?;
    let bucket = env::var("SUPABASE_BUCKET").unwrap_or_else(|_| "rawg-data".to_string());

    SnapshotArchive::new(base_url, api_key, bucket)
}

/// Format a number with thousand separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(891_123), "891,123");
    }
}
