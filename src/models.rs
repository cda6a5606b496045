/// Data Models Module
///
/// This module defines the core data structures used throughout the application.
/// These models represent RAWG game metadata in its wire form (paginated API
/// responses) and its normalized tabular form.
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One page of the RAWG bulk listing endpoint.
///
/// Every field deserializes to its default when absent so a partial body
/// degrades to an empty page instead of failing the pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

impl PageResponse {
    /// An empty page with no forward cursor. Terminates pagination.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A normalized game row: one record of the flat tabular form.
///
/// `game_id` is the natural key across the whole pipeline. All rows produced
/// by one normalization pass share the same `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameRow {
    pub game_id: i64,
    pub slug: String,
    pub name: String,
    pub released: Option<NaiveDate>,
    pub rating: f64,
    pub ratings_count: i64,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl GameRow {
    /// Transport form of `released`. The remote transport layer does not
    /// serialize temporal types, so dates travel as `YYYY-MM-DD` strings.
    pub fn released_str(&self) -> Option<String> {
        self.released.map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Transport form of `updated_at` (RFC 3339 with microseconds, UTC).
    pub fn updated_at_str(&self) -> String {
        self.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Connection status information displayed at startup
#[derive(Debug, Clone)]
pub struct ApiInfo {
    pub endpoint: String,
    pub total_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response_defaults_on_partial_body() {
        let page: PageResponse = serde_json::from_str("{}").unwrap();
        assert!(page.count.is_none());
        assert!(page.next.is_none());
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_released_transport_string() {
        let row = GameRow {
            game_id: 1,
            slug: "portal-2".into(),
            name: "Portal 2".into(),
            released: NaiveDate::from_ymd_opt(2011, 4, 18),
            rating: 4.6,
            ratings_count: 4200,
            platforms: vec!["PC".into()],
            genres: vec!["Puzzle".into()],
            updated_at: Utc::now(),
        };

        assert_eq!(row.released_str().as_deref(), Some("2011-04-18"));
    }

    #[test]
    fn test_updated_at_transport_string_is_rfc3339_utc() {
        let row = GameRow {
            game_id: 1,
            slug: "s".into(),
            name: "n".into(),
            released: None,
            rating: 0.0,
            ratings_count: 0,
            platforms: vec![],
            genres: vec![],
            updated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        assert_eq!(row.updated_at_str(), "2023-11-14T22:13:20.000000Z");
        assert!(row.released_str().is_none());
    }
}
