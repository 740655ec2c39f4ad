//! Enchor search API request and response types

use bridge_traits::catalog::CatalogQuery;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Free-text filter; the default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    pub value: String,
    pub exact: bool,
    pub exclude: bool,
}

/// Body of `POST /search/advanced`
///
/// Only the modification time and chart id bounds are set; every other filter
/// is left open so the whole catalog is reachable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchRequest {
    pub instrument: Option<String>,
    pub difficulty: Option<String>,
    pub drum_type: Option<String>,
    pub source: String,

    pub name: TextFilter,
    pub artist: TextFilter,
    pub album: TextFilter,
    pub genre: TextFilter,
    pub year: TextFilter,
    pub charter: TextFilter,

    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_intensity: Option<f64>,
    pub max_intensity: Option<f64>,
    #[serde(rename = "minAverageNPS")]
    pub min_average_nps: Option<f64>,
    #[serde(rename = "maxAverageNPS")]
    pub max_average_nps: Option<f64>,
    #[serde(rename = "minMaxNPS")]
    pub min_max_nps: Option<f64>,
    #[serde(rename = "maxMaxNPS")]
    pub max_max_nps: Option<f64>,
    pub min_year: Option<u32>,
    pub max_year: Option<u32>,

    /// ISO-8601 with millisecond precision
    pub modified_after: String,
    pub hash: String,
    pub track_hash: String,

    pub has_solo_sections: Option<bool>,
    pub has_forced_notes: Option<bool>,
    pub has_open_notes: Option<bool>,
    pub has_tap_notes: Option<bool>,
    pub has_lyrics: Option<bool>,
    pub has_vocals: Option<bool>,
    pub has_roll_lanes: Option<bool>,
    #[serde(rename = "has2xKick")]
    pub has_2x_kick: Option<bool>,
    pub has_issues: Option<bool>,
    pub has_video_background: Option<bool>,
    pub modchart: Option<bool>,

    pub chart_id_after: u64,
    #[serde(rename = "per_page")]
    pub per_page: u32,
}

impl AdvancedSearchRequest {
    pub fn for_query(query: &CatalogQuery) -> Self {
        Self {
            instrument: None,
            difficulty: None,
            drum_type: None,
            source: "website".to_string(),
            name: TextFilter::default(),
            artist: TextFilter::default(),
            album: TextFilter::default(),
            genre: TextFilter::default(),
            year: TextFilter::default(),
            charter: TextFilter::default(),
            min_length: None,
            max_length: None,
            min_intensity: None,
            max_intensity: None,
            min_average_nps: None,
            max_average_nps: None,
            min_max_nps: None,
            max_max_nps: None,
            min_year: None,
            max_year: None,
            modified_after: query
                .modified_after
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            hash: String::new(),
            track_hash: String::new(),
            has_solo_sections: None,
            has_forced_notes: None,
            has_open_notes: None,
            has_tap_notes: None,
            has_lyrics: None,
            has_vocals: None,
            has_roll_lanes: None,
            has_2x_kick: None,
            has_issues: None,
            has_video_background: None,
            modchart: None,
            chart_id_after: query.chart_id_after,
            per_page: query.per_page,
        }
    }
}

/// Response of `POST /search/advanced`
///
/// Records stay undecoded; normalization happens in the sync core.
#[derive(Debug, Deserialize)]
pub struct AdvancedSearchResponse {
    /// Total matches, when the API reports it
    #[serde(default)]
    pub found: Option<u64>,

    pub data: Vec<serde_json::Value>,
}
