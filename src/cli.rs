/// CLI Module
///
/// Command-line interface configuration using clap.
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::api::RetryPolicy;
use crate::etl::load::DEFAULT_TABLE;

/// Game Data Fetcher - ETL Pipeline
///
/// Fetch, normalize, and load RAWG video-game metadata into PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "game-data-fetcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// RAWG API key (overrides RAWG_API_KEY env var)
    #[arg(short = 'k', long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// API base URL (useful for a proxy or a test double)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Database connection URL (overrides DATABASE_URL env var)
    #[arg(short = 'd', long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Root directory for raw checkpoints and snapshots
    #[arg(long, value_name = "DIR", default_value = "data_local")]
    pub data_dir: PathBuf,

    /// Maximum number of attempts per page or key
    #[arg(long, value_name = "COUNT", default_value = "3")]
    pub max_retries: usize,

    /// Base retry delay in seconds (attempt n waits n times this)
    #[arg(long, value_name = "SECONDS", default_value = "2")]
    pub retry_delay: u64,

    /// Delay between consecutive API requests in milliseconds
    #[arg(long, value_name = "MILLIS", default_value = "500")]
    pub pacing_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the bulk games listing and write one raw checkpoint file
    Fetch {
        /// Records per page (the API caps this at 40)
        #[arg(short = 'p', long, value_name = "SIZE", default_value = "40")]
        page_size: u32,

        /// Release-date window, YYYY-MM-DD,YYYY-MM-DD
        #[arg(long, value_name = "RANGE")]
        dates: Option<String>,
    },

    /// Fetch per-game detail documents, one file per game
    Details {
        /// Game ids to fetch; pulled from the remote table when omitted
        #[arg(long, value_name = "IDS", value_delimiter = ',')]
        ids: Vec<i64>,

        /// Cooldown after a failed key in seconds
        #[arg(long, value_name = "SECONDS", default_value = "5")]
        cooldown: u64,

        /// Table to pull ids from when --ids is omitted
        #[arg(short = 't', long, value_name = "NAME", default_value = DEFAULT_TABLE)]
        table: String,

        /// Window size for the table read
        #[arg(short = 'b', long, value_name = "SIZE", default_value = "1000")]
        batch_size: i64,
    },

    /// Normalize the latest raw checkpoint into a snapshot file
    Clean,

    /// Promote the latest snapshot into the remote table
    Upsert {
        #[arg(short = 't', long, value_name = "NAME", default_value = DEFAULT_TABLE)]
        table: String,

        /// Also archive the snapshot to the blob store
        #[arg(long)]
        archive: bool,
    },

    /// Read the full remote table back with windowed reads
    Pull {
        #[arg(short = 't', long, value_name = "NAME", default_value = DEFAULT_TABLE)]
        table: String,

        #[arg(short = 'b', long, value_name = "SIZE", default_value = "1000")]
        batch_size: i64,
    },

    /// Run one full pass: fetch, clean, upsert
    Run {
        #[arg(short = 'p', long, value_name = "SIZE", default_value = "40")]
        page_size: u32,

        #[arg(long, value_name = "RANGE")]
        dates: Option<String>,

        #[arg(short = 't', long, value_name = "NAME", default_value = DEFAULT_TABLE)]
        table: String,

        #[arg(long)]
        archive: bool,
    },
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("Max retries must be greater than 0");
        }

        match &self.command {
            Command::Fetch { page_size, .. } | Command::Run { page_size, .. } => {
                if *page_size == 0 || *page_size > 40 {
                    anyhow::bail!("Page size must be between 1 and 40, got {}", page_size);
                }
            }
            Command::Details { batch_size, .. } | Command::Pull { batch_size, .. } => {
                if *batch_size <= 0 {
                    anyhow::bail!("Batch size must be greater than 0");
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay))
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Directory for bulk raw checkpoint files
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw").join("rawg").join("games")
    }

    /// Directory for per-game detail files
    pub fn detail_dir(&self) -> PathBuf {
        self.data_dir.join("raw").join("rawg").join("game_details")
    }

    /// Directory for columnar snapshot files
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("temp").join("rawg").join("games")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "game-data-fetcher",
            "--max-retries",
            "5",
            "run",
            "--page-size",
            "20",
            "--dates",
            "2025-09-01,2025-09-30",
            "--table",
            "games_staging",
        ])
        .unwrap();

        assert!(cli.validate().is_ok());
        assert_eq!(cli.max_retries, 5);
        match cli.command {
            Command::Run { page_size, dates, table, archive } => {
                assert_eq!(page_size, 20);
                assert_eq!(dates.as_deref(), Some("2025-09-01,2025-09-30"));
                assert_eq!(table, "games_staging");
                assert!(!archive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_page_size_over_api_cap_is_rejected() {
        let cli = Cli::try_parse_from(["game-data-fetcher", "fetch", "--page-size", "100"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_zero_retries_is_rejected() {
        let cli = Cli::try_parse_from(["game-data-fetcher", "--max-retries", "0", "clean"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_detail_ids_parse_comma_separated() {
        let cli = Cli::try_parse_from(["game-data-fetcher", "details", "--ids", "3498,3499,3500"]).unwrap();
        match cli.command {
            Command::Details { ids, .. } => assert_eq!(ids, vec![3498, 3499, 3500]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_data_directories_derive_from_data_dir() {
        let cli = Cli::try_parse_from(["game-data-fetcher", "--data-dir", "/tmp/etl", "clean"]).unwrap();

        assert_eq!(cli.raw_dir(), PathBuf::from("/tmp/etl/raw/rawg/games"));
        assert_eq!(cli.detail_dir(), PathBuf::from("/tmp/etl/raw/rawg/game_details"));
        assert_eq!(cli.snapshot_dir(), PathBuf::from("/tmp/etl/temp/rawg/games"));
    }
}
