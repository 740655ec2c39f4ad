//! # Catalog Records
//!
//! Raw catalog records and their normalized projection.
//!
//! ## Overview
//!
//! The catalog returns one JSON object per chart. Several charts can belong to
//! the same logical song (`groupId`). The mirror keeps only an explicit
//! allow-list of fields:
//!
//! - song metadata (`name`, `artist`, `album`, `genre`, `year`, `md5`,
//!   `charter`, `song_length`)
//! - per-instrument difficulty ratings (`diff_*`)
//! - feature flags (`five_lane_drums`, `pro_drums`, `hasLyrics`, `has2xKick`,
//!   `hasVideoBackground`)
//! - identity (`groupId`, `modifiedTime`)
//!
//! Everything else the catalog sends is dropped during deserialization.
//! A record without a usable `groupId` or `modifiedTime` cannot be merged and
//! is rejected with [`MalformedRecordError`].

use crate::error::MalformedRecordError;
use bridge_traits::catalog::ChartId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::convert::TryFrom;

/// Logical song identity shared by every chart of the same song.
pub type GroupId = u64;

/// Descriptive song metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Sent as a string by the catalog, occasionally as a bare number
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charter: Option<String>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_length: Option<u64>,
}

/// Difficulty rating per instrument track; absent when the chart lacks it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difficulties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_band: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_guitar: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_guitar_coop: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_rhythm: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_bass: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_drums: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_drums_real: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_keys: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_guitarghl: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_guitar_coop_ghl: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_rhythm_ghl: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_bassghl: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_vocals: Option<i32>,
}

/// Chart feature flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub five_lane_drums: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pro_drums: Option<bool>,
    #[serde(rename = "hasLyrics", default, skip_serializing_if = "Option::is_none")]
    pub has_lyrics: Option<bool>,
    #[serde(rename = "has2xKick", default, skip_serializing_if = "Option::is_none")]
    pub has_2x_kick: Option<bool>,
    #[serde(
        rename = "hasVideoBackground",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub has_video_background: Option<bool>,
}

/// A chart record as returned by the catalog search API.
///
/// Identity fields are optional here so that a record missing them can be
/// reported as malformed instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "chartId", default)]
    pub chart_id: Option<ChartId>,
    #[serde(rename = "groupId", default)]
    pub group_id: Option<GroupId>,
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: Option<String>,
    #[serde(flatten)]
    pub song: SongInfo,
    #[serde(flatten)]
    pub difficulties: Difficulties,
    #[serde(flatten)]
    pub features: ChartFeatures,
}

impl CatalogRecord {
    /// Decode one element of a catalog page.
    pub fn from_value(value: serde_json::Value) -> Result<Self, MalformedRecordError> {
        let chart_id = chart_id_of(&value);
        serde_json::from_value(value)
            .map_err(|e| MalformedRecordError::new(chart_id, format!("undecodable record: {}", e)))
    }
}

/// The persisted projection of a catalog record, owned by its `groupId`.
///
/// A later record for the same `groupId` replaces this one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "groupId")]
    pub group_id: GroupId,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    #[serde(flatten)]
    pub song: SongInfo,
    #[serde(flatten)]
    pub difficulties: Difficulties,
    #[serde(flatten)]
    pub features: ChartFeatures,
}

impl TryFrom<CatalogRecord> for NormalizedRecord {
    type Error = MalformedRecordError;

    fn try_from(raw: CatalogRecord) -> Result<Self, Self::Error> {
        let group_id = raw
            .group_id
            .ok_or_else(|| MalformedRecordError::new(raw.chart_id, "missing groupId"))?;

        let modified_time = raw
            .modified_time
            .as_deref()
            .ok_or_else(|| MalformedRecordError::new(raw.chart_id, "missing modifiedTime"))?;
        let modified_time = DateTime::parse_from_rfc3339(modified_time)
            .map_err(|e| {
                MalformedRecordError::new(
                    raw.chart_id,
                    format!("invalid modifiedTime {:?}: {}", modified_time, e),
                )
            })?
            .with_timezone(&Utc);

        Ok(Self {
            group_id,
            modified_time,
            song: raw.song,
            difficulties: raw.difficulties,
            features: raw.features,
        })
    }
}

/// Project a raw page element onto the mirrored field set.
pub fn normalize(value: serde_json::Value) -> Result<NormalizedRecord, MalformedRecordError> {
    CatalogRecord::from_value(value).and_then(NormalizedRecord::try_from)
}

/// Pagination key of a raw page element, if it carries a usable one.
pub fn chart_id_of(value: &serde_json::Value) -> Option<ChartId> {
    value.get("chartId").and_then(serde_json::Value::as_u64)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn full_record() -> serde_json::Value {
        json!({
            "chartId": 1201,
            "groupId": 88,
            "md5": "5f1e7a0c2d0b4b0d9a1f3c4e5d6a7b8c",
            "name": "Through the Fire and Flames",
            "artist": "DragonForce",
            "album": "Inhuman Rampage",
            "genre": "Power Metal",
            "year": "2006",
            "charter": "Harmonix",
            "song_length": 441000,
            "diff_guitar": 6,
            "diff_drums": 5,
            "diff_vocals": -1,
            "pro_drums": true,
            "hasLyrics": true,
            "has2xKick": false,
            "modifiedTime": "2024-03-01T12:30:00.000Z",
            "notesData": { "noteCount": 3722 },
            "applicationUsername": "someone",
            "packName": null
        })
    }

    #[test]
    fn test_normalize_keeps_allow_listed_fields() {
        let record = normalize(full_record()).unwrap();

        assert_eq!(record.group_id, 88);
        assert_eq!(
            record.modified_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        assert_eq!(record.song.name.as_deref(), Some("Through the Fire and Flames"));
        assert_eq!(record.song.year.as_deref(), Some("2006"));
        assert_eq!(record.song.song_length, Some(441000));
        assert_eq!(record.difficulties.diff_guitar, Some(6));
        assert_eq!(record.difficulties.diff_vocals, Some(-1));
        assert_eq!(record.difficulties.diff_bass, None);
        assert_eq!(record.features.has_lyrics, Some(true));
        assert_eq!(record.features.has_2x_kick, Some(false));
    }

    #[test]
    fn test_serialized_form_drops_unlisted_fields() {
        let record = normalize(full_record()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["groupId"], json!(88));
        assert_eq!(object["hasLyrics"], json!(true));
        assert!(object.contains_key("modifiedTime"));
        assert!(!object.contains_key("chartId"));
        assert!(!object.contains_key("notesData"));
        assert!(!object.contains_key("applicationUsername"));
        assert!(!object.contains_key("diff_bass"));

        let back: NormalizedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_group_id_is_malformed() {
        let mut value = full_record();
        value.as_object_mut().unwrap().remove("groupId");

        let error = normalize(value).unwrap_err();
        assert_eq!(error.chart_id, Some(1201));
        assert_eq!(error.reason, "missing groupId");
    }

    #[test]
    fn test_missing_modified_time_is_malformed() {
        let mut value = full_record();
        value.as_object_mut().unwrap().remove("modifiedTime");

        assert_eq!(normalize(value).unwrap_err().reason, "missing modifiedTime");
    }

    #[test]
    fn test_unparseable_modified_time_is_malformed() {
        let mut value = full_record();
        value["modifiedTime"] = json!("last tuesday");

        let error = normalize(value).unwrap_err();
        assert!(error.reason.starts_with("invalid modifiedTime"));
    }

    #[test]
    fn test_wrongly_typed_field_is_malformed_not_fatal() {
        let mut value = full_record();
        value["diff_guitar"] = json!("hard");

        let error = normalize(value).unwrap_err();
        assert_eq!(error.chart_id, Some(1201));
        assert!(error.reason.starts_with("undecodable record"));
    }

    #[test]
    fn test_numeric_year_accepted() {
        let mut value = full_record();
        value["year"] = json!(1999);

        assert_eq!(normalize(value).unwrap().song.year.as_deref(), Some("1999"));
    }

    #[test]
    fn test_chart_id_of() {
        assert_eq!(chart_id_of(&full_record()), Some(1201));
        assert_eq!(chart_id_of(&json!({ "groupId": 1 })), None);
        assert_eq!(chart_id_of(&json!("not an object")), None);
    }
}
