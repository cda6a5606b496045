/// Transform Module
///
/// Handles flattening of raw RAWG records into normalized game rows.
///
/// Normalization is a pure function over an ordered sequence of raw JSON
/// records: scalar fields map 1:1 by key, the nested platform/genre
/// collections flatten to ordered name lists, and every row of one batch
/// carries the same ingestion timestamp. Only a record missing its natural
/// key (`id`) is dropped; any other missing field degrades to a default.
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::models::GameRow;

/// Counters for one normalization batch
#[derive(Debug, Clone, Default)]
pub struct NormalizeStats {
    pub records_in: usize,
    pub rows_out: usize,
    /// Records dropped because the natural key was absent. Silent data loss
    /// unless reported, so the caller logs this at pass end.
    pub missing_id: usize,
    /// Count of optional fields that fell back to a default value.
    pub defaulted_fields: usize,
}

/// Normalize an ordered batch of raw records into game rows.
///
/// Output ordering matches input ordering. All rows share `updated_at`.
pub fn normalize_records(records: &[Value], updated_at: DateTime<Utc>) -> (Vec<GameRow>, NormalizeStats) {
    let mut stats = NormalizeStats { records_in: records.len(), ..Default::default() };
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        match normalize_record(record, updated_at, &mut stats) {
            Some(row) => rows.push(row),
            None => {
                stats.missing_id += 1;
                tracing::warn!("Dropping record without an id field: {}", summarize(record));
            }
        }
    }

    stats.rows_out = rows.len();

    if stats.missing_id > 0 {
        tracing::warn!("{} of {} records dropped for missing id", stats.missing_id, stats.records_in);
    }
    if stats.defaulted_fields > 0 {
        tracing::debug!("{} optional fields fell back to defaults", stats.defaulted_fields);
    }

    (rows, stats)
}

/// Normalize a single record. Returns None only when `id` is absent.
fn normalize_record(record: &Value, updated_at: DateTime<Utc>, stats: &mut NormalizeStats) -> Option<GameRow> {
    let game_id = record.get("id").and_then(|v| v.as_i64())?;

    let slug = scalar_str(record, "slug", stats);
    let name = scalar_str(record, "name", stats);

    // `released` is null for unannounced titles; an unparseable date is a
    // data-quality issue and degrades to null as well.
    let released = match record.get("released").and_then(|v| v.as_str()) {
        Some(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(e) => {
                stats.defaulted_fields += 1;
                tracing::warn!("Game {}: unparseable release date {:?}: {}", game_id, s, e);
                None
            }
        },
        None => None,
    };

    let rating = match record.get("rating").and_then(|v| v.as_f64()) {
        Some(r) => r,
        None => {
            stats.defaulted_fields += 1;
            0.0
        }
    };

    let ratings_count = match record.get("ratings_count").and_then(|v| v.as_i64()) {
        Some(c) => c,
        None => {
            stats.defaulted_fields += 1;
            0
        }
    };

    Some(GameRow {
        game_id,
        slug,
        name,
        released,
        rating,
        ratings_count,
        platforms: platform_names(record),
        genres: genre_names(record),
        updated_at,
    })
}

fn scalar_str(record: &Value, key: &str, stats: &mut NormalizeStats) -> String {
    match record.get(key).and_then(|v| v.as_str()) {
        Some(s) => s.to_string(),
        None => {
            stats.defaulted_fields += 1;
            String::new()
        }
    }
}

/// Flatten the nested platform list: `platforms[].platform.name`.
///
/// An absent or null outer collection degrades to an empty list. Source
/// order is preserved; names are not deduplicated.
pub fn platform_names(record: &Value) -> Vec<String> {
    nested_names(record.get("platforms"), |entry| entry.get("platform").and_then(|p| p.get("name")))
}

/// Flatten the nested genre list: `genres[].name`.
pub fn genre_names(record: &Value) -> Vec<String> {
    nested_names(record.get("genres"), |entry| entry.get("name"))
}

fn nested_names<'a, F>(collection: Option<&'a Value>, name_of: F) -> Vec<String>
where
    F: Fn(&'a Value) -> Option<&'a Value>,
{
    collection
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| name_of(entry).and_then(|n| n.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Short description of a record for log lines
fn summarize(record: &Value) -> String {
    let name = record.get("name").and_then(|v| v.as_str()).unwrap_or("<unnamed>");
    let slug = record.get("slug").and_then(|v| v.as_str()).unwrap_or("<no slug>");
    format!("name={name} slug={slug}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "id": 3498,
            "slug": "grand-theft-auto-v",
            "name": "Grand Theft Auto V",
            "released": "2013-09-17",
            "rating": 4.47,
            "ratings_count": 6844,
            "platforms": [
                {"platform": {"id": 187, "name": "PlayStation 5"}},
                {"platform": {"id": 4, "name": "PC"}},
                {"platform": {"id": 1, "name": "Xbox One"}}
            ],
            "genres": [
                {"id": 4, "name": "Action"},
                {"id": 3, "name": "Adventure"}
            ]
        })
    }

    #[test]
    fn test_scalar_fields_map_by_key() {
        let (rows, stats) = normalize_records(&[sample_record()], Utc::now());

        assert_eq!(stats.rows_out, 1);
        let row = &rows[0];
        assert_eq!(row.game_id, 3498);
        assert_eq!(row.slug, "grand-theft-auto-v");
        assert_eq!(row.name, "Grand Theft Auto V");
        assert_eq!(row.released, NaiveDate::from_ymd_opt(2013, 9, 17));
        assert_eq!(row.rating, 4.47);
        assert_eq!(row.ratings_count, 6844);
    }

    #[test]
    fn test_nested_collections_preserve_order() {
        let (rows, _) = normalize_records(&[sample_record()], Utc::now());

        assert_eq!(rows[0].platforms, vec!["PlayStation 5", "PC", "Xbox One"]);
        assert_eq!(rows[0].genres, vec!["Action", "Adventure"]);
    }

    #[test]
    fn test_missing_collections_degrade_to_empty_lists() {
        let record = json!({"id": 1, "slug": "s", "name": "n", "rating": 0.0, "ratings_count": 0});
        let (rows, _) = normalize_records(&[record], Utc::now());

        assert!(rows[0].platforms.is_empty());
        assert!(rows[0].genres.is_empty());
    }

    #[test]
    fn test_null_collections_degrade_to_empty_lists() {
        let record = json!({
            "id": 2,
            "slug": "s",
            "name": "n",
            "rating": 1.0,
            "ratings_count": 1,
            "platforms": null,
            "genres": null
        });
        let (rows, _) = normalize_records(&[record], Utc::now());

        assert!(rows[0].platforms.is_empty());
        assert!(rows[0].genres.is_empty());
    }

    #[test]
    fn test_record_without_id_is_dropped_and_counted() {
        let records = vec![json!({"slug": "no-id", "name": "No Id"}), sample_record()];
        let (rows, stats) = normalize_records(&records, Utc::now());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].game_id, 3498);
        assert_eq!(stats.missing_id, 1);
        assert_eq!(stats.records_in, 2);
        assert_eq!(stats.rows_out, 1);
    }

    #[test]
    fn test_missing_optional_scalars_default_instead_of_failing() {
        let record = json!({"id": 9});
        let (rows, stats) = normalize_records(&[record], Utc::now());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slug, "");
        assert_eq!(rows[0].name, "");
        assert!(rows[0].released.is_none());
        assert_eq!(rows[0].rating, 0.0);
        assert_eq!(rows[0].ratings_count, 0);
        assert!(stats.defaulted_fields >= 4);
    }

    #[test]
    fn test_batch_shares_one_ingestion_timestamp() {
        let stamp = Utc::now();
        let mut second = sample_record();
        second["id"] = json!(99);
        let (rows, _) = normalize_records(&[sample_record(), second], stamp);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.updated_at == stamp));
    }

    #[test]
    fn test_output_ordering_matches_input_ordering() {
        let records: Vec<Value> =
            (0..5).map(|i| json!({"id": i, "slug": format!("g{i}"), "name": format!("G{i}")})).collect();
        let (rows, _) = normalize_records(&records, Utc::now());

        let ids: Vec<i64> = rows.iter().map(|r| r.game_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
