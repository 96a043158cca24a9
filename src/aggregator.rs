//! Record aggregation across an activity history.
//!
//! Drives the segment search over a pool of candidate activities to find the
//! global best per target distance. Candidates are pruned in two stages
//! before any trace is fetched: a recency cap, then an average-speed
//! ranking cap. Per-candidate fetch or parse failures are recorded as skips
//! and never abort the aggregation.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::store::StreamStore;
use crate::{
    find_best_segment, ActivitySummary, Record, SearchConfig, Segment, TargetDistance, Trace,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Why a candidate activity was skipped instead of searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The stream store failed to deliver the trace
    FetchFailed { message: String },
    /// The trace was empty or had fewer than 2 valid samples
    UnusableTrace,
}

/// Outcome of one candidate activity within a target aggregation.
///
/// Skips are explicit rather than silently swallowed so callers and tests
/// can assert on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateOutcome {
    /// The trace was searched; `segment` is the best match, if any
    Searched {
        activity_id: String,
        segment: Option<Segment>,
    },
    /// The candidate was skipped before searching
    Skipped {
        activity_id: String,
        reason: SkipReason,
    },
}

/// Aggregation result for one target distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAggregation {
    /// The target distance this aggregation is for
    pub target: TargetDistance,
    /// Best record across all searched candidates, if any qualified
    pub record: Option<Record>,
    /// Per-candidate outcomes, in candidate-selection order
    pub outcomes: Vec<CandidateOutcome>,
}

impl TargetAggregation {
    /// Number of candidates whose trace was searched.
    pub fn searched_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CandidateOutcome::Searched { .. }))
            .count()
    }

    /// Number of candidates skipped before searching.
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CandidateOutcome::Skipped { .. }))
            .count()
    }
}

/// Compute the best record for every catalog distance from a candidate pool.
///
/// `activities` should already be restricted to record-eligible sports; the
/// per-target length filter and the pruning caps are applied here. A target
/// with no eligible candidates yields `record: None`, not an error.
pub fn compute_all_records<S: StreamStore>(
    activities: &[ActivitySummary],
    streams: &S,
    config: &SearchConfig,
) -> Vec<TargetAggregation> {
    TargetDistance::ALL
        .iter()
        .map(|&target| aggregate_target(target, activities, streams, config))
        .collect()
}

/// Parallel variant of [`compute_all_records`]: candidates within each
/// target are searched concurrently and combined by a min-duration
/// reduction. Identical results, better wall-clock on large histories.
#[cfg(feature = "parallel")]
pub fn compute_all_records_parallel<S: StreamStore + Sync>(
    activities: &[ActivitySummary],
    streams: &S,
    config: &SearchConfig,
) -> Vec<TargetAggregation> {
    TargetDistance::ALL
        .iter()
        .map(|&target| {
            let candidates = select_candidates(activities, target.kilometers(), config);
            if candidates.len() < 4 {
                return aggregate_from_outcomes(
                    target,
                    &candidates,
                    candidates
                        .iter()
                        .map(|a| search_candidate(a, target.meters(), streams, config))
                        .collect(),
                );
            }

            let outcomes: Vec<CandidateOutcome> = candidates
                .par_iter()
                .map(|a| search_candidate(a, target.meters(), streams, config))
                .collect();
            aggregate_from_outcomes(target, &candidates, outcomes)
        })
        .collect()
}

fn aggregate_target<S: StreamStore>(
    target: TargetDistance,
    activities: &[ActivitySummary],
    streams: &S,
    config: &SearchConfig,
) -> TargetAggregation {
    let candidates = select_candidates(activities, target.kilometers(), config);
    debug!(
        "[Records] {}: {} candidates after pruning ({} in pool)",
        target.key(),
        candidates.len(),
        activities.len()
    );

    let outcomes: Vec<CandidateOutcome> = candidates
        .iter()
        .map(|a| search_candidate(a, target.meters(), streams, config))
        .collect();

    aggregate_from_outcomes(target, &candidates, outcomes)
}

/// Pick the winning segment out of per-candidate outcomes.
fn aggregate_from_outcomes(
    target: TargetDistance,
    candidates: &[&ActivitySummary],
    outcomes: Vec<CandidateOutcome>,
) -> TargetAggregation {
    let mut best: Option<(&ActivitySummary, &Segment)> = None;

    for (&activity, outcome) in candidates.iter().zip(&outcomes) {
        if let CandidateOutcome::Searched {
            segment: Some(segment),
            ..
        } = outcome
        {
            let is_faster = best
                .map_or(true, |(_, b)| segment.duration_seconds < b.duration_seconds);
            if is_faster {
                best = Some((activity, segment));
            }
        }
    }

    let record = best.map(|(activity, segment)| Record::from_segment(target, segment, activity));

    TargetAggregation {
        target,
        record,
        outcomes,
    }
}

/// Two-stage candidate pruning: length filter, recency cap, then
/// average-speed ranking cap.
fn select_candidates<'a>(
    activities: &'a [ActivitySummary],
    target_km: f64,
    config: &SearchConfig,
) -> Vec<&'a ActivitySummary> {
    // An activity shorter than the target cannot contain the segment.
    let mut eligible: Vec<&ActivitySummary> = activities
        .iter()
        .filter(|a| a.distance_km >= target_km)
        .collect();

    // Most recent first, capped before ranking.
    eligible.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    eligible.truncate(config.recency_cap);

    // Fastest average pace first. A heuristic prioritization: faster
    // activities are more likely to contain a fast sub-segment.
    eligible.sort_by(|a, b| {
        b.average_speed_kmh()
            .partial_cmp(&a.average_speed_kmh())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    eligible.truncate(config.speed_rank_cap);

    eligible
}

/// Fetch and search one candidate, mapping failures to skips.
fn search_candidate<S: StreamStore>(
    activity: &ActivitySummary,
    target_m: f64,
    streams: &S,
    config: &SearchConfig,
) -> CandidateOutcome {
    let samples = match streams.get_trace(&activity.id) {
        Ok(samples) => samples,
        Err(err) => {
            warn!(
                "[Records] Skipping activity {}: trace fetch failed: {}",
                activity.id, err
            );
            return CandidateOutcome::Skipped {
                activity_id: activity.id.clone(),
                reason: SkipReason::FetchFailed {
                    message: err.to_string(),
                },
            };
        }
    };

    let trace = match Trace::from_samples(&activity.id, &samples) {
        Some(trace) => trace,
        None => {
            debug!(
                "[Records] Skipping activity {}: unusable trace ({} raw samples)",
                activity.id,
                samples.len()
            );
            return CandidateOutcome::Skipped {
                activity_id: activity.id.clone(),
                reason: SkipReason::UnusableTrace,
            };
        }
    };

    CandidateOutcome::Searched {
        activity_id: activity.id.clone(),
        segment: find_best_segment(&trace, target_m, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStreamStore;
    use crate::TraceSample;

    fn run(id: &str, distance_km: f64, duration_minutes: f64, start_date: i64) -> ActivitySummary {
        ActivitySummary {
            id: id.to_string(),
            name: format!("Run {}", id),
            distance_km,
            duration_minutes,
            sport_type: "Run".to_string(),
            start_date,
        }
    }

    /// Steady trace covering `distance_km` at `secs_per_km`, one sample per
    /// 100 m.
    fn steady_samples(distance_km: f64, secs_per_km: f64) -> Vec<TraceSample> {
        let count = (distance_km * 10.0) as usize;
        (0..=count)
            .map(|k| TraceSample::new(k as f64 * 100.0, k as f64 * secs_per_km / 10.0))
            .collect()
    }

    #[test]
    fn test_length_filter_excludes_short_activities() {
        let activities = vec![run("short", 8.0, 40.0, 100), run("long", 12.0, 60.0, 200)];

        let selected = select_candidates(&activities, 10.0, &SearchConfig::default());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "long");
    }

    #[test]
    fn test_speed_rank_cap() {
        // 30 eligible activities with increasing speed; only the fastest 20
        // survive the ranking cap.
        let activities: Vec<ActivitySummary> = (0..30)
            .map(|i| run(&format!("a{}", i), 10.0, 60.0 - i as f64, i as i64))
            .collect();

        let config = SearchConfig::default();
        let selected = select_candidates(&activities, 5.0, &config);
        assert_eq!(selected.len(), config.speed_rank_cap);
        // a29 has the shortest duration, hence the highest average speed.
        assert_eq!(selected[0].id, "a29");
    }

    #[test]
    fn test_recency_cap_applies_before_ranking() {
        // The oldest activity is by far the fastest, but a recency cap of 2
        // removes it from the pool before ranking.
        let activities = vec![
            run("old-fast", 10.0, 40.0, 100),
            run("recent-1", 10.0, 55.0, 200),
            run("recent-2", 10.0, 60.0, 300),
        ];

        let config = SearchConfig {
            recency_cap: 2,
            ..SearchConfig::default()
        };
        let selected = select_candidates(&activities, 5.0, &config);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|a| a.id != "old-fast"));
    }

    #[test]
    fn test_skips_are_explicit_and_do_not_abort() {
        let mut streams = MemoryStreamStore::new();
        // "good" has a full trace; "no-trace" is absent from the store;
        // "one-sample" cleans down to a single sample; "broken" errors on
        // fetch.
        streams.insert("good", steady_samples(10.0, 300.0));
        streams.insert("one-sample", vec![TraceSample::new(0.0, 0.0)]);
        streams.fail_for("broken");

        let activities = vec![
            run("good", 10.0, 50.0, 400),
            run("no-trace", 10.0, 55.0, 300),
            run("one-sample", 10.0, 60.0, 200),
            run("broken", 10.0, 65.0, 100),
        ];

        let aggregations =
            compute_all_records(&activities, &streams, &SearchConfig::default());
        let five_k = aggregations
            .iter()
            .find(|a| a.target == TargetDistance::FiveK)
            .unwrap();

        assert_eq!(five_k.searched_count(), 1);
        assert_eq!(five_k.skipped_count(), 3);
        assert!(five_k
            .outcomes
            .iter()
            .any(|o| matches!(o, CandidateOutcome::Skipped { reason: SkipReason::UnusableTrace, .. })));
        assert!(five_k
            .outcomes
            .iter()
            .any(|o| matches!(o, CandidateOutcome::Skipped { reason: SkipReason::FetchFailed { .. }, .. })));

        let record = five_k.record.as_ref().unwrap();
        assert_eq!(record.activity_id, "good");
        assert_eq!(record.time_seconds, 1500);
    }

    #[test]
    fn test_target_with_no_candidates_yields_none() {
        let streams = MemoryStreamStore::new();
        let activities = vec![run("a1", 6.0, 30.0, 100)];

        let aggregations =
            compute_all_records(&activities, &streams, &SearchConfig::default());
        let marathon = aggregations
            .iter()
            .find(|a| a.target == TargetDistance::Marathon)
            .unwrap();

        assert!(marathon.record.is_none());
        assert!(marathon.outcomes.is_empty());
    }

    #[test]
    fn test_best_record_wins_across_candidates() {
        let mut streams = MemoryStreamStore::new();
        streams.insert("slow", steady_samples(10.0, 330.0));
        streams.insert("fast", steady_samples(10.0, 285.0));

        let activities = vec![run("slow", 10.0, 55.0, 100), run("fast", 10.0, 47.5, 200)];

        let aggregations =
            compute_all_records(&activities, &streams, &SearchConfig::default());
        let ten_k = aggregations
            .iter()
            .find(|a| a.target == TargetDistance::TenK)
            .unwrap();

        let record = ten_k.record.as_ref().unwrap();
        assert_eq!(record.activity_id, "fast");
        assert_eq!(record.time_seconds, 2850);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let mut streams = MemoryStreamStore::new();
        let activities: Vec<ActivitySummary> = (0..8)
            .map(|i| {
                let id = format!("a{}", i);
                streams.insert(&id, steady_samples(10.0, 300.0 + i as f64));
                run(&id, 10.0, 50.0 + i as f64, i as i64)
            })
            .collect();

        let config = SearchConfig::default();
        let sequential = compute_all_records(&activities, &streams, &config);
        let parallel = compute_all_records_parallel(&activities, &streams, &config);

        for (s, p) in sequential.iter().zip(&parallel) {
            assert_eq!(s.target, p.target);
            assert_eq!(
                s.record.as_ref().map(|r| r.time_seconds),
                p.record.as_ref().map(|r| r.time_seconds)
            );
        }
    }
}
