//! Deduplication of catalog records by logical song.
//!
//! Several charts share one `groupId`. The merger keeps exactly one
//! [`NormalizedRecord`] per group: the one with the greatest `modifiedTime`.
//! On equal timestamps the record observed first wins.
//!
//! ```
//! use core_sync::merger::{DedupMerger, MergeOutcome};
//! # use core_sync::record::normalize;
//! # let record = normalize(serde_json::json!({
//! #     "chartId": 1, "groupId": 7, "modifiedTime": "2024-01-01T00:00:00Z"
//! # })).unwrap();
//!
//! let mut merger = DedupMerger::new();
//! assert!(merger.is_new_group(record.group_id));
//! assert_eq!(merger.observe(record.clone()), MergeOutcome::Inserted);
//! assert_eq!(merger.observe(record), MergeOutcome::Discarded);
//! assert_eq!(merger.len(), 1);
//! ```

use crate::record::{GroupId, NormalizedRecord};
use std::collections::BTreeMap;

/// What [`DedupMerger::observe`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First record for its group. Counts as a new song.
    Inserted,
    /// Strictly newer than the retained record, which it replaced.
    Replaced,
    /// Not newer than the retained record.
    Discarded,
}

/// Running `groupId -> NormalizedRecord` map for one sync run.
///
/// Ordered by `groupId` so snapshots are deterministic.
#[derive(Debug, Clone, Default)]
pub struct DedupMerger {
    records: BTreeMap<GroupId, NormalizedRecord>,
}

impl DedupMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a merger with records from an earlier snapshot.
    ///
    /// Seeded records go through the same merge rule, so duplicate groups in
    /// the input collapse to their newest entry.
    pub fn from_records(records: impl IntoIterator<Item = NormalizedRecord>) -> Self {
        let mut merger = Self::new();
        for record in records {
            merger.observe(record);
        }
        merger
    }

    /// Whether `group_id` has not been observed yet.
    pub fn is_new_group(&self, group_id: GroupId) -> bool {
        !self.records.contains_key(&group_id)
    }

    /// Merge one record, keeping the newest per group.
    pub fn observe(&mut self, record: NormalizedRecord) -> MergeOutcome {
        match self.records.get_mut(&record.group_id) {
            None => {
                self.records.insert(record.group_id, record);
                MergeOutcome::Inserted
            }
            Some(existing) if record.modified_time > existing.modified_time => {
                *existing = record;
                MergeOutcome::Replaced
            }
            Some(_) => MergeOutcome::Discarded,
        }
    }

    pub fn get(&self, group_id: GroupId) -> Option<&NormalizedRecord> {
        self.records.get(&group_id)
    }

    /// Number of distinct logical songs held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the current map.
    pub fn snapshot(&self) -> BTreeMap<GroupId, NormalizedRecord> {
        self.records.clone()
    }

    /// Consume the merger, yielding records ordered by `groupId`.
    pub fn into_records(self) -> Vec<NormalizedRecord> {
        self.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ChartFeatures, Difficulties, SongInfo};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn record(group_id: GroupId, modified_time: DateTime<Utc>, name: &str) -> NormalizedRecord {
        NormalizedRecord {
            group_id,
            modified_time,
            song: SongInfo {
                name: Some(name.to_string()),
                ..SongInfo::default()
            },
            difficulties: Difficulties::default(),
            features: ChartFeatures::default(),
        }
    }

    #[test]
    fn test_newer_record_replaces() {
        let mut merger = DedupMerger::new();
        assert_eq!(merger.observe(record(1, t0(), "first")), MergeOutcome::Inserted);
        assert_eq!(
            merger.observe(record(1, t0() + Duration::seconds(1), "second")),
            MergeOutcome::Replaced
        );

        assert_eq!(merger.len(), 1);
        assert_eq!(merger.get(1).unwrap().song.name.as_deref(), Some("second"));
    }

    #[test]
    fn test_older_record_discarded() {
        let mut merger = DedupMerger::new();
        merger.observe(record(1, t0(), "first"));
        assert_eq!(
            merger.observe(record(1, t0() - Duration::days(3), "stale")),
            MergeOutcome::Discarded
        );

        assert_eq!(merger.get(1).unwrap().song.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_tie_keeps_first_observed() {
        let mut merger = DedupMerger::new();
        merger.observe(record(1, t0(), "first"));
        assert_eq!(merger.observe(record(1, t0(), "tie")), MergeOutcome::Discarded);

        assert_eq!(merger.get(1).unwrap().song.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_newest_wins_regardless_of_arrival_order() {
        let times = [3i64, 9, 1, 7, 9, 2];
        let mut merger = DedupMerger::new();
        for (i, offset) in times.iter().enumerate() {
            merger.observe(record(5, t0() + Duration::hours(*offset), &i.to_string()));
        }

        let kept = merger.get(5).unwrap();
        assert_eq!(kept.modified_time, t0() + Duration::hours(9));
        assert_eq!(kept.song.name.as_deref(), Some("1"));
    }

    #[test]
    fn test_is_new_group() {
        let mut merger = DedupMerger::new();
        assert!(merger.is_new_group(42));
        merger.observe(record(42, t0(), "x"));
        assert!(!merger.is_new_group(42));
        assert!(merger.is_new_group(43));
    }

    #[test]
    fn test_snapshot_is_ordered_by_group() {
        let mut merger = DedupMerger::new();
        for group_id in [30, 10, 20] {
            merger.observe(record(group_id, t0(), "x"));
        }

        let keys: Vec<_> = merger.snapshot().keys().copied().collect();
        assert_eq!(keys, vec![10, 20, 30]);

        let groups: Vec<_> = merger.into_records().iter().map(|r| r.group_id).collect();
        assert_eq!(groups, vec![10, 20, 30]);
    }

    #[test]
    fn test_from_records_collapses_duplicates() {
        let merger = DedupMerger::from_records(vec![
            record(1, t0(), "old"),
            record(2, t0(), "other"),
            record(1, t0() + Duration::minutes(5), "new"),
        ]);

        assert_eq!(merger.len(), 2);
        assert_eq!(merger.get(1).unwrap().song.name.as_deref(), Some("new"));
    }
}
