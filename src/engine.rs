//! # Record Engine
//!
//! Stateful entry point owning the persisted record-per-distance state.
//!
//! The engine decides between a full rebuild (aggregate over the eligible
//! history) and an incremental update (search one new activity against the
//! stored records). In both paths the write goes through the record store's
//! conditional upsert, so stored records only ever improve.
//!
//! ## Architecture
//!
//! The engine reads activity metadata and traces through the store seams
//! and is the sole writer of record rows:
//! - Full rebuild: activity store → aggregator → segment search → upserts
//! - Incremental: single trace → segment search per target → conditional
//!   upsert, reporting which targets were broken

use std::collections::HashMap;

use log::{info, warn};

use crate::aggregator::{compute_all_records, TargetAggregation};
use crate::error::{RecordError, Result};
use crate::store::{ActivityFilter, ActivityStore, RecordStore, StreamStore};
use crate::{
    find_best_segment, is_record_sport, ActivitySummary, Record, SearchConfig, TargetDistance,
    Trace,
};

/// Record store synchronizer over injected store implementations.
pub struct RecordEngine<A, S, R> {
    activities: A,
    streams: S,
    records: R,
    config: SearchConfig,
}

impl<A: ActivityStore, S: StreamStore, R: RecordStore> RecordEngine<A, S, R> {
    /// Create an engine with default configuration.
    pub fn new(activities: A, streams: S, records: R) -> Self {
        Self::with_config(activities, streams, records, SearchConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(activities: A, streams: S, records: R, config: SearchConfig) -> Self {
        Self {
            activities,
            streams,
            records,
            config,
        }
    }

    /// Current search configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Read access to the underlying record store.
    pub fn record_store(&self) -> &R {
        &self.records
    }

    // ========================================================================
    // Full Rebuild
    // ========================================================================

    /// Recompute every record from the full eligible activity history and
    /// upsert the results.
    ///
    /// Safe to re-run: recomputing from unchanged history writes the same or
    /// better data, never worse. Returns the per-target aggregation
    /// outcomes.
    pub fn initialize_records(&mut self) -> Result<Vec<TargetAggregation>> {
        let filter = ActivityFilter {
            sport_types: Some(vec!["Run".to_string(), "Trail".to_string()]),
            min_distance_km: Some(self.config.min_distance_km),
            ..ActivityFilter::default()
        };
        let history = self.activities.get_activities(&filter)?;
        info!(
            "[Records] Rebuilding records from {} eligible activities",
            history.len()
        );

        let aggregations = compute_all_records(&history, &self.streams, &self.config);

        for aggregation in &aggregations {
            if let Some(record) = &aggregation.record {
                self.records.upsert_if_faster(record)?;
            }
        }

        Ok(aggregations)
    }

    /// Initialize the record store if (and only if) it is empty.
    ///
    /// Returns whether an initialization ran.
    pub fn ensure_records_initialized(&mut self) -> Result<bool> {
        if self.records.count()? > 0 {
            return Ok(false);
        }
        info!("[Records] Record store is empty, running full rebuild");
        self.initialize_records()?;
        Ok(true)
    }

    // ========================================================================
    // Incremental Update
    // ========================================================================

    /// Check a single newly ingested activity against the stored records.
    ///
    /// Searches only this activity's trace, one target at a time, and
    /// applies each candidate through the store's conditional upsert.
    /// Returns the targets whose record was broken; an ineligible sport,
    /// a too-short activity, or an unusable trace yields an empty list.
    pub fn check_and_update_record_with_activity(
        &mut self,
        activity_id: &str,
        activity: &ActivitySummary,
    ) -> Result<Vec<TargetDistance>> {
        if !is_record_sport(&activity.sport_type) {
            return Ok(Vec::new());
        }
        if activity.distance_km < self.config.min_distance_km {
            return Ok(Vec::new());
        }

        let samples = match self.streams.get_trace(activity_id) {
            Ok(samples) => samples,
            Err(err) => {
                warn!(
                    "[Records] Trace fetch failed for activity {}: {}",
                    activity_id, err
                );
                return Ok(Vec::new());
            }
        };

        let trace = match Trace::from_samples(activity_id, &samples) {
            Some(trace) => trace,
            None => return Ok(Vec::new()),
        };

        let mut broken = Vec::new();

        for target in TargetDistance::ALL {
            if activity.distance_km < target.kilometers() {
                continue;
            }

            let segment = match find_best_segment(&trace, target.meters(), &self.config) {
                Some(segment) => segment,
                None => continue,
            };

            let record = Record::from_segment(target, &segment, activity);
            if self.records.upsert_if_faster(&record)? {
                info!(
                    "[Records] New {} record: {} ({})",
                    target.key(),
                    record.time_formatted(),
                    record.activity_name
                );
                broken.push(target);
            }
        }

        Ok(broken)
    }

    /// Ingestion hook: look up a freshly stored activity and run the
    /// incremental record check on it.
    pub fn on_new_activity(&mut self, activity_id: &str) -> Result<Vec<TargetDistance>> {
        let activity = self
            .activities
            .get_activity(activity_id)?
            .ok_or_else(|| RecordError::ActivityNotFound {
                activity_id: activity_id.to_string(),
            })?;
        self.check_and_update_record_with_activity(activity_id, &activity)
    }

    // ========================================================================
    // Read Surface
    // ========================================================================

    /// Current records for all catalog distances, `None` where no record is
    /// stored yet. Missing records are a normal outcome, never an error.
    pub fn get_all_records(&self) -> Result<HashMap<&'static str, Option<Record>>> {
        let mut records = HashMap::new();
        for target in TargetDistance::ALL {
            records.insert(target.key(), self.records.get(target.key())?);
        }
        Ok(records)
    }

    /// Records for all catalog distances as a JSON object keyed by distance
    /// key. Returns `{}` if the store is unreachable.
    pub fn get_all_records_json(&self) -> String {
        match self.get_all_records() {
            Ok(records) => serde_json::to_string(&records).unwrap_or_else(|_| "{}".to_string()),
            Err(err) => {
                warn!("[Records] Failed to read records: {}", err);
                "{}".to_string()
            }
        }
    }

    /// Run the initialization guard, then read all records.
    pub fn ensure_initialized_and_get_records(
        &mut self,
    ) -> Result<HashMap<&'static str, Option<Record>>> {
        self.ensure_records_initialized()?;
        self.get_all_records()
    }
}
