/// Snapshot Module
///
/// Writes one normalized batch to an immutable Parquet snapshot file and
/// reads snapshots back for promotion to the remote table.
///
/// Snapshots are atomic: the batch is written to a `.tmp` sibling and
/// renamed into place, so readers never observe a partial file. Filenames
/// embed a sortable UTC timestamp and the latest snapshot is the
/// lexicographically greatest matching name, independent of filesystem
/// metadata.
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{
    Array, Date32Array, Float64Array, Int64Array, ListArray, ListBuilder, StringArray, StringBuilder,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::latest_file;
use crate::models::GameRow;

pub const SNAPSHOT_PREFIX: &str = "rawg_games_cleaned_";
pub const SNAPSHOT_SUFFIX: &str = ".parquet";

/// Canonical schema of a game snapshot
pub fn games_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("game_id", DataType::Int64, false),
        Field::new("slug", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("released", DataType::Date32, true),
        Field::new("rating", DataType::Float64, false),
        Field::new("ratings_count", DataType::Int64, false),
        Field::new("platforms", DataType::List(Arc::new(Field::new_list_field(DataType::Utf8, true))), false),
        Field::new("genres", DataType::List(Arc::new(Field::new_list_field(DataType::Utf8, true))), false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())), false),
    ]))
}

/// Write one batch as a new timestamped snapshot in `dir`
pub fn write_snapshot(rows: &[GameRow], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;

    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("{SNAPSHOT_PREFIX}{stamp}{SNAPSHOT_SUFFIX}"));
    write_snapshot_to(rows, &path)?;

    Ok(path)
}

/// Write one batch to an explicit snapshot path, atomically.
///
/// The file is complete and discoverable after rename, or absent; a failed
/// write leaves at most a `.tmp` sibling that the prefix/suffix filter of
/// `latest_snapshot` never selects.
pub fn write_snapshot_to(rows: &[GameRow], path: &Path) -> Result<()> {
    let batch = rows_to_batch(rows)?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path).with_context(|| format!("Failed to create {}", tmp_path.display()))?;

    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .with_context(|| format!("Failed to open parquet writer for {}", tmp_path.display()))?;
    writer.write(&batch).context("Failed to write record batch")?;
    writer.close().context("Failed to close parquet writer")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to publish snapshot {}", path.display()))?;

    tracing::info!("Wrote snapshot {} with {} rows", path.display(), rows.len());
    Ok(())
}

/// Select the snapshot with the greatest timestamp-derived name
pub fn latest_snapshot(dir: &Path) -> Result<PathBuf> {
    latest_file(dir, SNAPSHOT_PREFIX, SNAPSHOT_SUFFIX)?
        .with_context(|| format!("No snapshot files found in {}", dir.display()))
}

/// Read a snapshot file back into rows, preserving row order
pub fn read_snapshot(path: &Path) -> Result<Vec<GameRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open snapshot {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read parquet metadata from {}", path.display()))?
        .build()
        .context("Failed to build parquet reader")?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.context("Failed to decode record batch")?;
        rows.extend(batch_to_rows(&batch)?);
    }

    Ok(rows)
}

/// Encode rows into a single record batch
pub fn rows_to_batch(rows: &[GameRow]) -> Result<RecordBatch> {
    let game_ids = Int64Array::from(rows.iter().map(|r| r.game_id).collect::<Vec<_>>());
    let slugs = StringArray::from(rows.iter().map(|r| r.slug.as_str()).collect::<Vec<_>>());
    let names = StringArray::from(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>());
    let released = Date32Array::from(
        rows.iter().map(|r| r.released.map(|d| (d - epoch_date()).num_days() as i32)).collect::<Vec<_>>(),
    );
    let ratings = Float64Array::from(rows.iter().map(|r| r.rating).collect::<Vec<_>>());
    let ratings_counts = Int64Array::from(rows.iter().map(|r| r.ratings_count).collect::<Vec<_>>());
    let platforms = string_list_array(rows.iter().map(|r| r.platforms.as_slice()));
    let genres = string_list_array(rows.iter().map(|r| r.genres.as_slice()));
    let updated_at =
        TimestampMicrosecondArray::from(rows.iter().map(|r| r.updated_at.timestamp_micros()).collect::<Vec<_>>())
            .with_timezone("UTC");

    RecordBatch::try_new(
        games_schema(),
        vec![
            Arc::new(game_ids),
            Arc::new(slugs),
            Arc::new(names),
            Arc::new(released),
            Arc::new(ratings),
            Arc::new(ratings_counts),
            Arc::new(platforms),
            Arc::new(genres),
            Arc::new(updated_at),
        ],
    )
    .context("Failed to build snapshot record batch")
}

/// Decode one record batch back into rows
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<GameRow>> {
    let game_ids: &Int64Array = column(batch, "game_id")?;
    let slugs: &StringArray = column(batch, "slug")?;
    let names: &StringArray = column(batch, "name")?;
    let released: &Date32Array = column(batch, "released")?;
    let ratings: &Float64Array = column(batch, "rating")?;
    let ratings_counts: &Int64Array = column(batch, "ratings_count")?;
    let platforms: &ListArray = column(batch, "platforms")?;
    let genres: &ListArray = column(batch, "genres")?;
    let updated_at: &TimestampMicrosecondArray = column(batch, "updated_at")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let released = if released.is_null(i) {
            None
        } else {
            Some(epoch_date() + TimeDelta::days(released.value(i) as i64))
        };

        let updated_at = DateTime::from_timestamp_micros(updated_at.value(i))
            .with_context(|| format!("Row {i}: updated_at out of range"))?;

        rows.push(GameRow {
            game_id: game_ids.value(i),
            slug: slugs.value(i).to_string(),
            name: names.value(i).to_string(),
            released,
            rating: ratings.value(i),
            ratings_count: ratings_counts.value(i),
            platforms: string_list_values(platforms, i)?,
            genres: string_list_values(genres, i)?,
            updated_at,
        });
    }

    Ok(rows)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Snapshot is missing column {name}"))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Column {name} has an unexpected type"))
}

fn string_list_array<'a>(lists: impl Iterator<Item = &'a [String]>) -> ListArray {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in lists {
        for item in list {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    builder.finish()
}

fn string_list_values(col: &ListArray, row: usize) -> Result<Vec<String>> {
    let values = col.value(row);
    let strings =
        values.as_any().downcast_ref::<StringArray>().context("List column items have an unexpected type")?;

    Ok((0..strings.len()).map(|j| strings.value(j).to_string()).collect())
}

fn epoch_date() -> NaiveDate {
    DateTime::UNIX_EPOCH.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_rows() -> Vec<GameRow> {
        // Microsecond-precision timestamp so values survive the round trip.
        let stamp = DateTime::from_timestamp_micros(1_725_600_000_123_456).unwrap();
        vec![
            GameRow {
                game_id: 3498,
                slug: "grand-theft-auto-v".into(),
                name: "Grand Theft Auto V".into(),
                released: NaiveDate::from_ymd_opt(2013, 9, 17),
                rating: 4.47,
                ratings_count: 6844,
                platforms: vec!["PlayStation 5".into(), "PC".into()],
                genres: vec!["Action".into()],
                updated_at: stamp,
            },
            GameRow {
                game_id: 799_265,
                slug: "unannounced-sequel".into(),
                name: "Unannounced Sequel".into(),
                released: None,
                rating: 0.0,
                ratings_count: 0,
                platforms: vec![],
                genres: vec![],
                updated_at: stamp,
            },
        ]
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let rows = sample_rows();

        let path = write_snapshot(&rows, dir.path()).unwrap();
        let restored = read_snapshot(&path).unwrap();

        assert_eq!(restored, rows);
    }

    #[test]
    fn test_empty_batch_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let path = write_snapshot(&[], dir.path()).unwrap();
        let restored = read_snapshot(&path).unwrap();

        assert!(restored.is_empty());
    }

    #[test]
    fn test_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(&sample_rows(), dir.path()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_latest_snapshot_is_lexicographically_greatest() {
        let dir = tempfile::tempdir().unwrap();
        let rows = sample_rows();

        for stamp in ["2025-09-01_08-00-00", "2025-09-03_07-59-59", "2025-09-02_23-00-00"] {
            let path = dir.path().join(format!("{SNAPSHOT_PREFIX}{stamp}{SNAPSHOT_SUFFIX}"));
            write_snapshot_to(&rows, &path).unwrap();
        }

        let latest = latest_snapshot(dir.path()).unwrap();
        let name = latest.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("{SNAPSHOT_PREFIX}2025-09-03_07-59-59{SNAPSHOT_SUFFIX}"));
    }

    #[test]
    fn test_latest_snapshot_errors_when_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_snapshot(dir.path()).is_err());
    }
}
