/// Extract Module
///
/// Handles fetching data from the RAWG API: the paginated bulk listing pass
/// and the per-key detail pass. Both write their durable JSON artifacts
/// before any downstream stage runs, so a pass can be resumed from disk.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tokio::time::sleep;

use super::latest_file;
use crate::api::{FetchError, GamesQuery, RawgClient, RetryPolicy};
use crate::models::PageResponse;

pub const RAW_PREFIX: &str = "rawg_games_response_";
pub const RAW_SUFFIX: &str = ".json";
pub const DETAIL_PREFIX: &str = "game_";

/// Statistics for one bulk fetch pass
#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub records_fetched: usize,
    /// Total record count the API reported for the query, when it did.
    pub total_reported: Option<u64>,
}

/// Statistics for one detail fetch pass
#[derive(Debug, Clone, Default)]
pub struct DetailStats {
    pub keys_attempted: usize,
    pub keys_succeeded: usize,
    pub keys_failed: usize,
    pub failed_ids: Vec<i64>,
}

/// Collect the complete ordered union of result records across all pages.
///
/// Starts at page 1 and follows the `next` cursor until the API stops
/// advertising one. A page that stays failed after retries, or returns a
/// malformed body, degrades to an empty page; an empty page carries no
/// cursor, so the pass terminates there.
pub async fn fetch_all_games(
    client: &RawgClient,
    query: &GamesQuery,
    pacing: Duration,
    retry: &RetryPolicy,
) -> (Vec<Value>, FetchStats) {
    let mut stats = FetchStats::default();
    let mut all_results: Vec<Value> = Vec::new();
    let mut page: u32 = 1;

    loop {
        let response = match fetch_page_with_retry(client, query, page, retry).await {
            Some(response) => {
                stats.pages_fetched += 1;
                response
            }
            None => {
                stats.pages_failed += 1;
                PageResponse::empty()
            }
        };

        if stats.total_reported.is_none() {
            stats.total_reported = response.count;
        }

        println!("   📄 Page {}: {} records", page, response.results.len());
        all_results.extend(response.results);

        if let Some(total) = stats.total_reported {
            let remaining = total.saturating_sub(all_results.len() as u64);
            tracing::debug!("Page {} done, {} records remaining", page, remaining);
        }

        if response.next.is_none() {
            break;
        }
        page += 1;

        // Pacing keeps us under the API rate limit; it is not a retry delay.
        if !pacing.is_zero() {
            sleep(pacing).await;
        }
    }

    stats.records_fetched = all_results.len();
    (all_results, stats)
}

/// Fetch one page, retrying transport errors per the policy.
///
/// Returns None when the page is given up on: a malformed body (never
/// retried, the API is telling us something other than JSON) or exhausted
/// retry attempts.
async fn fetch_page_with_retry(
    client: &RawgClient,
    query: &GamesQuery,
    page: u32,
    retry: &RetryPolicy,
) -> Option<PageResponse> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match client.fetch_games_page(query, page).await {
            Ok(response) => return Some(response),
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                tracing::warn!("Page {} failed, retrying ({}/{}): {}", page, attempt, retry.max_attempts, e);
                sleep(retry.delay_for(attempt)).await;
            }
            Err(e) => {
                tracing::warn!("Page {} skipped after {} attempt(s): {}", page, attempt, e);
                return None;
            }
        }
    }
}

/// Run the bulk fetch pass and checkpoint the result to one raw file
pub async fn run_fetch_pass(
    client: &RawgClient,
    query: &GamesQuery,
    pacing: Duration,
    retry: &RetryPolicy,
    raw_dir: &Path,
) -> Result<(PathBuf, FetchStats)> {
    println!("\n🔄 Starting bulk fetch pass...");
    println!("   Endpoint: {}", client.endpoint());
    println!("   Page size: {}", query.page_size);
    if let Some(dates) = &query.dates {
        println!("   Date window: {}", dates);
    }

    let start = Instant::now();
    let (records, stats) = fetch_all_games(client, query, pacing, retry).await;
    let path = write_raw_checkpoint(&records, raw_dir)?;
    let elapsed = start.elapsed().as_secs_f64();

    println!("\n✅ Bulk fetch complete!");
    println!("   ⏱️  Total time: {:.2}s ({:.2} min)", elapsed, elapsed / 60.0);
    println!("   📄 Pages: {} fetched, {} failed", stats.pages_fetched, stats.pages_failed);
    println!("   📝 Records collected: {}", stats.records_fetched);
    if let Some(total) = stats.total_reported {
        println!("   🎯 API reported total: {}", total);
    }
    println!("   💾 Raw checkpoint: {}", path.display());

    tracing::info!(
        pages = stats.pages_fetched,
        failed = stats.pages_failed,
        records = stats.records_fetched,
        elapsed_secs = elapsed,
        "Bulk fetch pass complete"
    );

    Ok((path, stats))
}

/// Run the per-key detail pass.
///
/// Each key is requested independently; a failure is isolated: logged,
/// cooled down, and the loop moves to the next key. A successful result is
/// written to its own file immediately so partial progress survives a
/// crash mid-run.
pub async fn run_detail_pass(
    client: &RawgClient,
    ids: &[i64],
    pacing: Duration,
    cooldown: Duration,
    retry: &RetryPolicy,
    detail_dir: &Path,
) -> Result<DetailStats> {
    fs::create_dir_all(detail_dir)
        .with_context(|| format!("Failed to create detail directory {}", detail_dir.display()))?;

    println!("\n🔄 Starting detail fetch pass for {} games...", ids.len());
    let start = Instant::now();
    let mut stats = DetailStats::default();

    for (i, &game_id) in ids.iter().enumerate() {
        stats.keys_attempted += 1;

        match fetch_detail_with_retry(client, game_id, retry).await {
            Ok(detail) => {
                write_detail_file(&detail, game_id, detail_dir)?;
                stats.keys_succeeded += 1;
            }
            Err(e) => {
                stats.keys_failed += 1;
                stats.failed_ids.push(game_id);
                tracing::warn!("Detail fetch failed for game {}: {}", game_id, e);

                // Longer pause after a failure; the usual cause is rate limiting.
                if !cooldown.is_zero() {
                    sleep(cooldown).await;
                }
            }
        }

        let done = i + 1;
        if done % 25 == 0 || done == ids.len() {
            println!(
                "   📊 Progress: {}/{} games | ✅ {} | ❌ {}",
                done,
                ids.len(),
                stats.keys_succeeded,
                stats.keys_failed
            );
        }

        if done < ids.len() && !pacing.is_zero() {
            sleep(pacing).await;
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!("\n✅ Detail fetch complete!");
    println!("   ⏱️  Total time: {:.2}s", elapsed);
    println!(
        "   📝 Games: {} attempted, {} fetched, {} failed",
        stats.keys_attempted, stats.keys_succeeded, stats.keys_failed
    );
    if !stats.failed_ids.is_empty() {
        tracing::warn!("Failed game ids: {:?}", stats.failed_ids);
    }

    Ok(stats)
}

async fn fetch_detail_with_retry(client: &RawgClient, game_id: i64, retry: &RetryPolicy) -> Result<Value, FetchError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match client.fetch_game_detail(game_id).await {
            Ok(detail) => return Ok(detail),
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                tracing::warn!("Game {} failed, retrying ({}/{}): {}", game_id, attempt, retry.max_attempts, e);
                sleep(retry.delay_for(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Write one bulk pass result to a timestamped raw checkpoint file
pub fn write_raw_checkpoint(records: &[Value], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create raw directory {}", dir.display()))?;

    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("{RAW_PREFIX}{stamp}{RAW_SUFFIX}"));
    let body = serde_json::to_vec_pretty(records).context("Failed to serialize raw records")?;
    fs::write(&path, body).with_context(|| format!("Failed to write raw checkpoint {}", path.display()))?;

    tracing::info!("Wrote raw checkpoint {} with {} records", path.display(), records.len());
    Ok(path)
}

fn write_detail_file(detail: &Value, game_id: i64, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{DETAIL_PREFIX}{game_id}{RAW_SUFFIX}"));
    let body = serde_json::to_vec_pretty(detail).context("Failed to serialize detail record")?;
    fs::write(&path, body).with_context(|| format!("Failed to write detail file {}", path.display()))?;

    Ok(path)
}

/// Select the raw checkpoint with the greatest timestamp-derived name
pub fn latest_raw_file(dir: &Path) -> Result<PathBuf> {
    latest_file(dir, RAW_PREFIX, RAW_SUFFIX)?
        .with_context(|| format!("No raw checkpoint files found in {}", dir.display()))
}

/// Read a raw checkpoint back into records.
///
/// Accepts both shapes on disk: a bare record array (bulk pass output) and
/// a single page body with a `results` field.
pub fn read_raw_records(path: &Path) -> Result<Vec<Value>> {
    let body = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&body).with_context(|| format!("Failed to parse {}", path.display()))?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(records)) => Ok(records),
            _ => anyhow::bail!("{} has no results array", path.display()),
        },
        _ => anyhow::bail!("{} is not a raw records document", path.display()),
    }
}
