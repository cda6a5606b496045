/// Pipeline Module
///
/// Orchestrates the complete pass: Fetch → Normalize → Snapshot → Upsert
/// with per-stage error handling and statistics tracking.
///
/// Each stage reads its input fresh from the durable artifact the previous
/// stage wrote (raw checkpoint file, snapshot file), so no in-memory state
/// crosses a stage boundary.
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::api::{GamesQuery, RawgClient, RetryPolicy};
use crate::db::{Database, SnapshotArchive};
use crate::etl::{extract, load, snapshot, transform};

/// Pipeline execution statistics
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub records_fetched: usize,
    pub rows_normalized: usize,
    pub rows_dropped: usize,
    pub rows_upserted: usize,
    pub elapsed_time: Duration,
    pub errors: Vec<PipelineError>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.records_fetched as f64 / secs
        }
    }

    /// Share of fetched records dropped during normalization, in percent
    pub fn drop_rate(&self) -> f64 {
        if self.records_fetched == 0 {
            0.0
        } else {
            (self.rows_dropped as f64 / self.records_fetched as f64) * 100.0
        }
    }
}

/// Pipeline error with context
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum PipelineStage {
    Fetch,
    Normalize,
    Snapshot,
    Upsert,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Fetch => write!(f, "Fetch"),
            PipelineStage::Normalize => write!(f, "Normalize"),
            PipelineStage::Snapshot => write!(f, "Snapshot"),
            PipelineStage::Upsert => write!(f, "Upsert"),
        }
    }
}

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub query: GamesQuery,
    pub pacing: Duration,
    pub retry: RetryPolicy,
    pub table: String,
    pub raw_dir: PathBuf,
    pub snapshot_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: GamesQuery::default(),
            pacing: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            table: load::DEFAULT_TABLE.to_string(),
            raw_dir: PathBuf::from("data_local/raw/rawg/games"),
            snapshot_dir: PathBuf::from("data_local/temp/rawg/games"),
        }
    }
}

/// Main ETL Pipeline
pub struct Pipeline {
    client: RawgClient,
    database: Database,
    archive: Option<SnapshotArchive>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline instance
    pub fn new(
        client: RawgClient,
        database: Database,
        archive: Option<SnapshotArchive>,
        config: PipelineConfig,
    ) -> Self {
        Self { client, database, archive, config }
    }

    /// Run one complete pass.
    ///
    /// Per-unit failures (a page, a record) are absorbed by the stages and
    /// show up in the stats; a whole-artifact failure (raw checkpoint,
    /// snapshot write, upsert submission, archival) aborts the pass.
    pub async fn run(&self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut stats = PipelineStats::new();

        tracing::info!("Starting pipeline pass into table {}", self.config.table);

        println!("\n🚀 Starting ETL pipeline pass...");
        println!("   🎯 Target table: {}", self.config.table);
        println!("   📦 Page size: {}", self.config.query.page_size);
        println!("   🔄 Max retries: {}", self.config.retry.max_attempts);

        // Fetch: paginate the listing endpoint, checkpoint raw JSON to disk
        let (raw_path, fetch_stats) = extract::run_fetch_pass(
            &self.client,
            &self.config.query,
            self.config.pacing,
            &self.config.retry,
            &self.config.raw_dir,
        )
        .await
        .context("Fetch stage failed")?;

        stats.pages_fetched = fetch_stats.pages_fetched;
        stats.pages_failed = fetch_stats.pages_failed;
        stats.records_fetched = fetch_stats.records_fetched;
        if fetch_stats.pages_failed > 0 {
            stats.errors.push(PipelineError {
                stage: PipelineStage::Fetch,
                message: format!("{} page(s) degraded to empty", fetch_stats.pages_failed),
            });
        }

        // Normalize: read the checkpoint back, flatten into rows
        let records = extract::read_raw_records(&raw_path).context("Normalize stage failed")?;
        let updated_at = Utc::now();
        let (rows, norm_stats) = transform::normalize_records(&records, updated_at);

        stats.rows_normalized = norm_stats.rows_out;
        stats.rows_dropped = norm_stats.missing_id;
        if norm_stats.missing_id > 0 {
            stats.errors.push(PipelineError {
                stage: PipelineStage::Normalize,
                message: format!("{} record(s) dropped for missing id", norm_stats.missing_id),
            });
        }

        // Snapshot: one immutable columnar file per pass
        let snapshot_path =
            snapshot::write_snapshot(&rows, &self.config.snapshot_dir).context("Snapshot stage failed")?;
        println!("   🗂️  Snapshot: {}", snapshot_path.display());

        if let Some(archive) = &self.archive {
            archive.upload(&snapshot_path).await.context("Snapshot archival failed")?;
        }

        // Upsert: promote the snapshot just written, reading it back from
        // disk. No automatic retry of the whole batch; the upsert is
        // idempotent, so the operator re-runs the pass instead.
        let promoted = snapshot::read_snapshot(&snapshot_path).context("Upsert stage failed")?;
        stats.rows_upserted = load::upsert_games(self.database.pool(), &self.config.table, &promoted)
            .await
            .context("Upsert stage failed")?;

        let total = self.database.row_count(&self.config.table).await.unwrap_or(-1);
        if total >= 0 {
            println!("   💾 Table {} now holds {} rows", self.config.table, total);
        }

        stats.elapsed_time = start_time.elapsed();

        println!("\n✅ Pipeline pass complete!");
        self.print_final_stats(&stats);

        tracing::info!(
            pages = stats.pages_fetched,
            records = stats.records_fetched,
            rows = stats.rows_upserted,
            dropped = stats.rows_dropped,
            elapsed_secs = stats.elapsed_time.as_secs_f64(),
            "Pipeline pass complete"
        );

        Ok(stats)
    }

    /// Print final statistics
    fn print_final_stats(&self, stats: &PipelineStats) {
        println!("\n📊 Pipeline Statistics:");
        println!("   ⏱️  Total time: {:.2}s", stats.elapsed_time.as_secs_f64());
        println!("   📄 Pages: {} fetched, {} failed", stats.pages_fetched, stats.pages_failed);
        println!("   📝 Records fetched: {}", stats.records_fetched);
        println!("   🧹 Rows normalized: {} ({} dropped, {:.1}%)", stats.rows_normalized, stats.rows_dropped, stats.drop_rate());
        println!("   💾 Rows upserted: {}", stats.rows_upserted);
        println!("   ⚡ Throughput: {:.1} records/sec", stats.records_per_second());

        if !stats.errors.is_empty() {
            println!("\n❌ Issues encountered: {}", stats.errors.len());
            for (i, error) in stats.errors.iter().take(5).enumerate() {
                println!("   {}. [{}] {}", i + 1, error.stage, error.message);
            }
            if stats.errors.len() > 5 {
                println!("   ... and {} more", stats.errors.len() - 5);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_is_zero_safe() {
        let stats = PipelineStats::new();
        assert_eq!(stats.records_per_second(), 0.0);
        assert_eq!(stats.drop_rate(), 0.0);
    }

    #[test]
    fn test_drop_rate() {
        let stats = PipelineStats {
            records_fetched: 200,
            rows_normalized: 190,
            rows_dropped: 10,
            ..PipelineStats::new()
        };
        assert_eq!(stats.drop_rate(), 5.0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Fetch.to_string(), "Fetch");
        assert_eq!(PipelineStage::Upsert.to_string(), "Upsert");
    }
}
