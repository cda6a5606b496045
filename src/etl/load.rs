/// Load Module
///
/// Handles the batched upsert into the remote games table and the windowed
/// read-back of the full table contents.
use anyhow::{bail, Context, Result};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::GameRow;

pub const DEFAULT_TABLE: &str = "rawg_games_cleaned";

const UPSERT_COLUMNS: &str = "game_id, slug, name, released, rating, ratings_count, platforms, genres, updated_at";

/// Validate an operator-supplied table name before it is interpolated into
/// SQL. Identifiers cannot travel as bind parameters.
pub fn validate_table_name(table: &str) -> Result<()> {
    let valid_start = table.chars().next().map(|c| c.is_ascii_lowercase() || c == '_').unwrap_or(false);
    let valid_rest = table.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_start || !valid_rest {
        bail!("Invalid table name {:?}: expected [a-z_][a-z0-9_]*", table);
    }
    Ok(())
}

/// Perform one batched idempotent upsert keyed on `game_id`.
///
/// The whole row set travels as a single statement; a transport failure is
/// surfaced to the caller and fails the pass. Re-running the same batch is
/// safe: on a key collision every non-key column is replaced by the
/// incoming row (last write wins).
pub async fn upsert_games(pool: &PgPool, table: &str, rows: &[GameRow]) -> Result<usize> {
    validate_table_name(table)?;

    if rows.is_empty() {
        tracing::info!("Nothing to upsert into {}", table);
        return Ok(0);
    }

    let mut qb = build_upsert_query(table, rows);
    qb.build()
        .execute(pool)
        .await
        .with_context(|| format!("Batched upsert of {} rows into {} failed", rows.len(), table))?;

    tracing::info!("Upserted {} rows into {}", rows.len(), table);
    Ok(rows.len())
}

/// Build the single upsert statement for one row set.
///
/// Temporal columns travel as canonical strings (the transport layer does
/// not serialize temporal types) and are cast back to their column types
/// in SQL.
fn build_upsert_query<'a>(table: &str, rows: &'a [GameRow]) -> QueryBuilder<'a, Postgres> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!("INSERT INTO {table} ({UPSERT_COLUMNS}) "));

    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.game_id)
            .push_bind(&row.slug)
            .push_bind(&row.name)
            .push_bind(row.released_str())
            .push_unseparated("::date")
            .push_bind(row.rating)
            .push_bind(row.ratings_count)
            .push_bind(&row.platforms)
            .push_bind(&row.genres)
            .push_bind(row.updated_at_str())
            .push_unseparated("::timestamptz");
    });

    qb.push(
        " ON CONFLICT (game_id) DO UPDATE SET \
           slug = EXCLUDED.slug, \
           name = EXCLUDED.name, \
           released = EXCLUDED.released, \
           rating = EXCLUDED.rating, \
           ratings_count = EXCLUDED.ratings_count, \
           platforms = EXCLUDED.platforms, \
           genres = EXCLUDED.genres, \
           updated_at = EXCLUDED.updated_at, \
           processed_at = NOW()",
    );

    qb
}

/// Reconstruct the complete current table contents.
///
/// Sequential fixed-size windowed reads, repeated until a window returns
/// zero rows. `ORDER BY game_id` pins the ordering explicitly rather than
/// assuming a stable store default; the union is complete as long as the
/// table is not concurrently mutated mid-read.
pub async fn pull_all_games(pool: &PgPool, table: &str, batch_size: i64) -> Result<Vec<GameRow>> {
    validate_table_name(table)?;

    let sql = format!(
        "SELECT {UPSERT_COLUMNS} FROM {table} ORDER BY game_id LIMIT $1 OFFSET $2"
    );

    let mut all_rows: Vec<GameRow> = Vec::new();
    let mut offset: i64 = 0;

    loop {
        let window: Vec<GameRow> = sqlx::query_as(&sql)
            .bind(batch_size)
            .bind(offset)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Windowed read from {} failed at offset {}", table, offset))?;

        if window.is_empty() {
            break;
        }

        offset += window.len() as i64;
        all_rows.extend(window);
    }

    tracing::info!("Pulled {} rows from {}", all_rows.len(), table);
    Ok(all_rows)
}
