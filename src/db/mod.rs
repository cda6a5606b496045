/// Database Module
///
/// This module handles the remote stores:
/// - PostgreSQL connection pool management and schema migrations
/// - the companion blob store that archives snapshot files
use std::path::Path;

use anyhow::{bail, Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::etl::load::validate_table_name;

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("Failed to run database migrations")?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("Database connection test failed")?;

        Ok(())
    }

    /// Current row count of a games table
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        validate_table_name(table)?;

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count rows in {table}"))?;

        Ok(count)
    }
}

/// Client for the blob store that keeps archival copies of snapshot files.
///
/// Speaks the Supabase storage REST surface: one authenticated POST per
/// object, `x-upsert` so a re-run of the same pass overwrites its copy.
pub struct SnapshotArchive {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SnapshotArchive {
    pub fn new(base_url: String, api_key: String, bucket: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to build blob store client")?;

        Ok(Self { client, base_url, api_key, bucket })
    }

    /// Upload one snapshot file under `games/<filename>` in the bucket
    pub async fn upload(&self, path: &Path) -> Result<()> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;

        let url = format!("{}/storage/v1/object/{}/games/{}", self.base_url, self.bucket, filename);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .context("Blob store upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Blob store rejected {} with status {}", filename, status);
        }

        tracing::info!("Archived snapshot {} to bucket {}", filename, self.bucket);
        Ok(())
    }
}
