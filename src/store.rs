//! Store interfaces for the engine's external collaborators, plus in-memory
//! implementations.
//!
//! The engine core never owns activity or stream data; it reads both through
//! these seams and writes records through [`RecordStore`]. The in-memory
//! stores back the test suite and small embeddings; production deployments
//! implement the traits over their own storage (`SqliteRecordStore` under
//! the `persistence` feature is the bundled record store).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RecordError, Result};
use crate::{normalize_sport, ActivitySummary, Record, TraceSample};

/// Filter for activity history queries.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Keep only these sports, compared after normalization
    pub sport_types: Option<Vec<String>>,
    /// Keep only activities at least this long, in kilometers
    pub min_distance_km: Option<f64>,
    /// Keep only activities starting at or after this unix timestamp
    pub since: Option<i64>,
    /// Cap the number of returned activities
    pub limit: Option<usize>,
}

/// Read access to activity metadata.
pub trait ActivityStore {
    /// Fetch activity summaries matching a filter.
    fn get_activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivitySummary>>;

    /// Fetch a single activity summary by id.
    fn get_activity(&self, activity_id: &str) -> Result<Option<ActivitySummary>>;
}

/// Read access to per-activity distance/time streams.
pub trait StreamStore {
    /// Fetch the raw trace for an activity, ordered by time ascending.
    /// An unknown activity yields an empty trace, not an error.
    fn get_trace(&self, activity_id: &str) -> Result<Vec<TraceSample>>;
}

/// Durable storage of the current best record per target distance.
///
/// The write path is a conditional compare-and-swap: a record is applied
/// only when no record exists for its key or the new time is strictly
/// faster. This makes concurrent update attempts safe regardless of caller
/// discipline and guarantees stored records never regress.
pub trait RecordStore {
    /// Read the current record for a distance key.
    fn get(&self, distance_key: &str) -> Result<Option<Record>>;

    /// Write `record` only if it beats the stored one (or none is stored).
    /// Returns whether the write was applied. The store stamps `updated_at`.
    fn upsert_if_faster(&mut self, record: &Record) -> Result<bool>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// In-Memory Stores
// ============================================================================

/// Vec-backed activity store.
#[derive(Debug, Clone, Default)]
pub struct MemoryActivityStore {
    activities: Vec<ActivitySummary>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an activity to the store.
    pub fn push(&mut self, activity: ActivitySummary) {
        self.activities.push(activity);
    }
}

impl ActivityStore for MemoryActivityStore {
    fn get_activities(&self, filter: &ActivityFilter) -> Result<Vec<ActivitySummary>> {
        let mut matching: Vec<ActivitySummary> = self
            .activities
            .iter()
            .filter(|a| {
                filter.sport_types.as_ref().map_or(true, |sports| {
                    sports.iter().any(|s| s == normalize_sport(&a.sport_type))
                })
            })
            .filter(|a| filter.min_distance_km.map_or(true, |min| a.distance_km >= min))
            .filter(|a| filter.since.map_or(true, |since| a.start_date >= since))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    fn get_activity(&self, activity_id: &str) -> Result<Option<ActivitySummary>> {
        Ok(self.activities.iter().find(|a| a.id == activity_id).cloned())
    }
}

/// HashMap-backed stream store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamStore {
    traces: HashMap<String, Vec<TraceSample>>,
    failing: Vec<String>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the trace for an activity.
    pub fn insert(&mut self, activity_id: &str, samples: Vec<TraceSample>) {
        self.traces.insert(activity_id.to_string(), samples);
    }

    /// Make `get_trace` fail for an activity (for exercising skip paths).
    pub fn fail_for(&mut self, activity_id: &str) {
        self.failing.push(activity_id.to_string());
    }
}

impl StreamStore for MemoryStreamStore {
    fn get_trace(&self, activity_id: &str) -> Result<Vec<TraceSample>> {
        if self.failing.iter().any(|id| id == activity_id) {
            return Err(RecordError::Store {
                message: format!("stream fetch failed for '{}'", activity_id),
            });
        }
        Ok(self.traces.get(activity_id).cloned().unwrap_or_default())
    }
}

/// HashMap-backed record store with the conditional upsert semantics of the
/// durable implementations.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: HashMap<String, Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, distance_key: &str) -> Result<Option<Record>> {
        Ok(self.records.get(distance_key).cloned())
    }

    fn upsert_if_faster(&mut self, record: &Record) -> Result<bool> {
        let key = record.target.key();
        let applies = match self.records.get(key) {
            Some(existing) => record.time_seconds < existing.time_seconds,
            None => true,
        };

        if applies {
            let mut stored = record.clone();
            stored.updated_at = now_unix();
            self.records.insert(key.to_string(), stored);
        }
        Ok(applies)
    }

    fn count(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Segment, TargetDistance};

    fn activity(id: &str, sport: &str, distance_km: f64, start_date: i64) -> ActivitySummary {
        ActivitySummary {
            id: id.to_string(),
            name: format!("Activity {}", id),
            distance_km,
            duration_minutes: distance_km * 5.0,
            sport_type: sport.to_string(),
            start_date,
        }
    }

    fn record(target: TargetDistance, time_seconds: u32) -> Record {
        let segment = Segment {
            start_index: 0,
            end_index: 1,
            duration_seconds: time_seconds as f64,
            distance_m: target.meters(),
            start_distance_m: 0.0,
            end_distance_m: target.meters(),
        };
        Record::from_segment(target, &segment, &activity("a1", "Run", 10.0, 1700000000))
    }

    #[test]
    fn test_activity_filter() {
        let mut store = MemoryActivityStore::new();
        store.push(activity("run", "Run", 10.0, 100));
        store.push(activity("trail", "TrailRun", 21.0, 200));
        store.push(activity("ride", "Ride", 40.0, 300));
        store.push(activity("short", "Run", 3.0, 400));

        let filter = ActivityFilter {
            sport_types: Some(vec!["Run".to_string(), "Trail".to_string()]),
            min_distance_km: Some(5.0),
            ..ActivityFilter::default()
        };

        let matching = store.get_activities(&filter).unwrap();
        let ids: Vec<&str> = matching.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["run", "trail"]);

        let since = ActivityFilter {
            since: Some(150),
            limit: Some(1),
            ..ActivityFilter::default()
        };
        let matching = store.get_activities(&since).unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, "trail");
    }

    #[test]
    fn test_stream_store_missing_is_empty() {
        let store = MemoryStreamStore::new();
        assert!(store.get_trace("unknown").unwrap().is_empty());
    }

    #[test]
    fn test_stream_store_failure() {
        let mut store = MemoryStreamStore::new();
        store.fail_for("broken");
        assert!(store.get_trace("broken").is_err());
    }

    #[test]
    fn test_conditional_upsert() {
        let mut store = MemoryRecordStore::new();

        // First write always applies.
        assert!(store.upsert_if_faster(&record(TargetDistance::FiveK, 1500)).unwrap());
        assert_eq!(store.count().unwrap(), 1);

        // Slower and equal times are rejected.
        assert!(!store.upsert_if_faster(&record(TargetDistance::FiveK, 1600)).unwrap());
        assert!(!store.upsert_if_faster(&record(TargetDistance::FiveK, 1500)).unwrap());
        assert_eq!(
            store.get("5k").unwrap().unwrap().time_seconds,
            1500
        );

        // Strictly faster applies.
        assert!(store.upsert_if_faster(&record(TargetDistance::FiveK, 1440)).unwrap());
        assert_eq!(
            store.get("5k").unwrap().unwrap().time_seconds,
            1440
        );

        // Other keys are independent.
        assert!(store.upsert_if_faster(&record(TargetDistance::TenK, 3000)).unwrap());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_store_stamps_updated_at() {
        let mut store = MemoryRecordStore::new();
        let rec = record(TargetDistance::FiveK, 1500);
        assert_eq!(rec.updated_at, 0);

        store.upsert_if_faster(&rec).unwrap();
        assert!(store.get("5k").unwrap().unwrap().updated_at > 0);
    }
}
