//! # Record Engine
//!
//! Personal record detection and fastest-segment search over GPS activity
//! streams.
//!
//! This library provides:
//! - Fastest contiguous segment search for fixed race distances (5k, 10k,
//!   half marathon, 30k, marathon) over distance/time traces
//! - Record aggregation across an activity history with candidate pruning
//! - Incremental record updates as new activities arrive, backed by a
//!   conditional (only-if-faster) upsert
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel candidate search with rayon
//! - **`persistence`** - Enable the SQLite-backed record store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use record_engine::{RecordEngine, TargetDistance};
//! use record_engine::store::{MemoryActivityStore, MemoryRecordStore, MemoryStreamStore};
//!
//! let mut engine = RecordEngine::new(
//!     MemoryActivityStore::new(),
//!     MemoryStreamStore::new(),
//!     MemoryRecordStore::new(),
//! );
//!
//! // Empty history: the guard initializes the store and every catalog
//! // distance reports no record yet.
//! engine.ensure_records_initialized().unwrap();
//! let records = engine.get_all_records().unwrap();
//! assert!(records[TargetDistance::FiveK.key()].is_none());
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{RecordError, Result};

// Fastest-segment search over a single trace
pub mod segment;
pub use segment::find_best_segment;

// Record aggregation across an activity history
pub mod aggregator;
pub use aggregator::{compute_all_records, CandidateOutcome, SkipReason, TargetAggregation};
#[cfg(feature = "parallel")]
pub use aggregator::compute_all_records_parallel;

// Store interfaces and in-memory implementations
pub mod store;
pub use store::{ActivityFilter, ActivityStore, RecordStore, StreamStore};

// SQLite-backed record store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteRecordStore;

// Stateful record engine (record store synchronizer + exposed surface)
pub mod engine;
pub use engine::RecordEngine;

// ============================================================================
// Core Types
// ============================================================================

/// A raw stream sample as delivered by a [`StreamStore`].
///
/// Either field may be missing; such samples are dropped when building a
/// [`Trace`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Cumulative distance from the activity start in meters
    pub distance_m: Option<f64>,
    /// Elapsed time from the activity start in seconds
    pub time_s: Option<f64>,
}

impl TraceSample {
    /// Create a sample with both fields present.
    pub fn new(distance_m: f64, time_s: f64) -> Self {
        Self {
            distance_m: Some(distance_m),
            time_s: Some(time_s),
        }
    }
}

/// Cleaned distance/time trace for one activity, sorted by elapsed time.
///
/// Construction drops malformed samples (missing, non-finite, or negative
/// values) and requires at least 2 valid samples, the minimum to define a
/// segment. Cumulative distance is expected to be non-decreasing; GPS jitter
/// occasionally violates this and is not corrected here.
#[derive(Debug, Clone)]
pub struct Trace {
    activity_id: String,
    distances: Vec<f64>,
    times: Vec<f64>,
}

impl Trace {
    /// Build a trace from raw stream samples.
    ///
    /// Returns `None` if fewer than 2 valid samples remain after cleaning.
    pub fn from_samples(activity_id: &str, samples: &[TraceSample]) -> Option<Self> {
        let mut cleaned: Vec<(f64, f64)> = samples
            .iter()
            .filter_map(|s| match (s.time_s, s.distance_m) {
                (Some(t), Some(d))
                    if t.is_finite() && d.is_finite() && t >= 0.0 && d >= 0.0 =>
                {
                    Some((t, d))
                }
                _ => None,
            })
            .collect();

        if cleaned.len() < 2 {
            return None;
        }

        // Source data is expected pre-sorted; sort defensively anyway.
        cleaned.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let (times, distances): (Vec<f64>, Vec<f64>) = cleaned.into_iter().unzip();

        Some(Self {
            activity_id: activity_id.to_string(),
            distances,
            times,
        })
    }

    /// Activity this trace belongs to.
    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// Cumulative distances in meters, sorted by elapsed time.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Elapsed times in seconds, ascending.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Number of valid samples.
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    /// Always false for a constructed trace (construction requires 2 samples).
    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

/// The fixed catalog of race distances tracked for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetDistance {
    #[serde(rename = "5k")]
    FiveK,
    #[serde(rename = "10k")]
    TenK,
    #[serde(rename = "semi")]
    HalfMarathon,
    #[serde(rename = "30k")]
    ThirtyK,
    #[serde(rename = "marathon")]
    Marathon,
}

impl TargetDistance {
    /// All tracked distances, shortest first.
    pub const ALL: [TargetDistance; 5] = [
        TargetDistance::FiveK,
        TargetDistance::TenK,
        TargetDistance::HalfMarathon,
        TargetDistance::ThirtyK,
        TargetDistance::Marathon,
    ];

    /// Stable string key used for storage and display.
    pub fn key(self) -> &'static str {
        match self {
            TargetDistance::FiveK => "5k",
            TargetDistance::TenK => "10k",
            TargetDistance::HalfMarathon => "semi",
            TargetDistance::ThirtyK => "30k",
            TargetDistance::Marathon => "marathon",
        }
    }

    /// Target distance in meters.
    pub fn meters(self) -> f64 {
        match self {
            TargetDistance::FiveK => 5000.0,
            TargetDistance::TenK => 10000.0,
            TargetDistance::HalfMarathon => 21097.5,
            TargetDistance::ThirtyK => 30000.0,
            TargetDistance::Marathon => 42195.0,
        }
    }

    /// Target distance in kilometers.
    pub fn kilometers(self) -> f64 {
        self.meters() / 1000.0
    }

    /// Look up a distance by its storage key.
    pub fn from_key(key: &str) -> Option<Self> {
        TargetDistance::ALL.iter().copied().find(|t| t.key() == key)
    }
}

/// A candidate result: a contiguous sub-range of a trace matching a target
/// distance within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start sample index into the trace
    pub start_index: usize,
    /// End sample index into the trace
    pub end_index: usize,
    /// Elapsed time across the segment in seconds
    pub duration_seconds: f64,
    /// Actual distance covered in meters (within tolerance of the target)
    pub distance_m: f64,
    /// Cumulative distance at the segment start in meters
    pub start_distance_m: f64,
    /// Cumulative distance at the segment end in meters
    pub end_distance_m: f64,
}

impl Segment {
    /// Segment start position in kilometers from the activity start.
    pub fn start_km(&self) -> f64 {
        self.start_distance_m / 1000.0
    }

    /// Segment end position in kilometers from the activity start.
    pub fn end_km(&self) -> f64 {
        self.end_distance_m / 1000.0
    }
}

/// Persisted best-known result for one target distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Which catalog distance this record is for
    pub target: TargetDistance,
    /// Target distance in kilometers
    pub distance_km: f64,
    /// Segment duration in whole seconds
    pub time_seconds: u32,
    /// Pace in seconds per kilometer
    pub pace_seconds_per_km: f64,
    /// Activity where the record was set
    pub activity_id: String,
    /// Name of that activity
    pub activity_name: String,
    /// Activity start date (unix seconds)
    pub activity_date: i64,
    /// Segment start position in kilometers
    pub start_km: f64,
    /// Segment end position in kilometers
    pub end_km: f64,
    /// When the record row was last written (unix seconds, stamped by the store)
    pub updated_at: i64,
}

impl Record {
    /// Build a record from a winning segment and its source activity.
    ///
    /// `updated_at` is left at 0; the record store stamps it on write.
    pub fn from_segment(target: TargetDistance, segment: &Segment, activity: &ActivitySummary) -> Self {
        Self {
            target,
            distance_km: target.kilometers(),
            time_seconds: segment.duration_seconds as u32,
            pace_seconds_per_km: segment.duration_seconds / target.kilometers(),
            activity_id: activity.id.clone(),
            activity_name: activity.name.clone(),
            activity_date: activity.start_date,
            start_km: segment.start_km(),
            end_km: segment.end_km(),
            updated_at: 0,
        }
    }

    /// Format the record time as "MM:SS", or "H:MM:SS" above one hour.
    pub fn time_formatted(&self) -> String {
        let hours = self.time_seconds / 3600;
        let minutes = (self.time_seconds % 3600) / 60;
        let seconds = self.time_seconds % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }

    /// Format the pace as "M:SS" per kilometer.
    pub fn pace_formatted(&self) -> String {
        let minutes = (self.pace_seconds_per_km / 60.0) as u32;
        let seconds = (self.pace_seconds_per_km % 60.0) as u32;
        format!("{}:{:02}", minutes, seconds)
    }

    /// Link to the source activity on Strava.
    pub fn activity_url(&self) -> String {
        format!("https://www.strava.com/activities/{}", self.activity_id)
    }
}

/// Activity metadata used for candidate selection and record attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: String,
    pub name: String,
    /// Total distance in kilometers
    pub distance_km: f64,
    /// Moving time in minutes
    pub duration_minutes: f64,
    /// Source sport label (e.g. "Run", "TrailRun")
    pub sport_type: String,
    /// Start date (unix seconds)
    pub start_date: i64,
}

impl ActivitySummary {
    /// Average speed in km/h, or 0 for degenerate durations.
    pub fn average_speed_kmh(&self) -> f64 {
        if self.duration_minutes <= 0.0 {
            return 0.0;
        }
        self.distance_km / (self.duration_minutes / 60.0)
    }
}

/// Map a source-specific sport label onto the fixed vocabulary.
pub fn normalize_sport(raw: &str) -> &str {
    match raw {
        "TrailRun" => "Trail",
        "Ride" => "Bike",
        other => other,
    }
}

/// Whether an activity's sport is eligible for distance records.
pub fn is_record_sport(raw: &str) -> bool {
    matches!(normalize_sport(raw), "Run" | "Trail")
}

/// Configuration for segment search and candidate pruning.
///
/// The caps are accuracy/performance trade-offs, not correctness
/// requirements: a genuine record is assumed to live among the most recent
/// or fastest-paced activities.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum allowed deviation between a segment's actual distance and the
    /// target, in meters. Default: 50.0
    pub tolerance_m: f64,

    /// Cap on evaluated start indices per trace; the stride between starts is
    /// `max(1, len / max_start_points)`. Results are an approximation of the
    /// true optimum, negligible at ~1 Hz GPS sampling. Default: 500
    pub max_start_points: usize,

    /// Most-recent-activities cap applied before speed ranking. Default: 100
    pub recency_cap: usize,

    /// Top-ranked-by-average-speed cap applied after the recency cap.
    /// Default: 20
    pub speed_rank_cap: usize,

    /// Minimum activity distance to be record-eligible, in kilometers
    /// (the smallest catalog target). Default: 5.0
    pub min_distance_km: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance_m: 50.0,
            max_start_points: 500,
            recency_cap: 100,
            speed_rank_cap: 20,
            min_distance_km: 5.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
