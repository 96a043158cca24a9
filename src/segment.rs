//! Fastest-segment search over a single activity trace.
//!
//! Given a cleaned distance/time trace and a target distance, find the
//! fastest contiguous window whose length matches the target within
//! tolerance. Start candidates are stride-sampled to bound cost on long
//! traces, and the matching end index is located by binary search over the
//! cumulative distance array.
//!
//! ## Accuracy caveats
//!
//! - Stride sampling means the result is an approximation of the true
//!   optimum: a window starting between two sampled indices is never
//!   evaluated. At ~1 Hz GPS sampling the loss is negligible relative to the
//!   50 m tolerance.
//! - Raw cumulative distance is not corrected for GPS jitter. The binary
//!   search assumes a non-decreasing distance array; small decreases can
//!   hide candidates. This matches the upstream data contract and is a
//!   known, accepted gap.

use crate::{SearchConfig, Segment, Trace};

/// Find the fastest contiguous segment of `target_m` meters in a trace.
///
/// Accepts a window only when its actual distance is within
/// `config.tolerance_m` of the target; there is no fallback to the
/// second-nearest end index. Returns `None` when no window qualifies, which
/// is a normal outcome for traces shorter than the target.
///
/// Ties on duration resolve to the first window found (lowest start index);
/// callers should not rely on a specific winner among exact ties.
///
/// # Example
/// ```
/// use record_engine::{find_best_segment, SearchConfig, Trace, TraceSample};
///
/// // 100 m every 30 s: steady 5:00/km pace over 10 km.
/// let samples: Vec<TraceSample> = (0..=100)
///     .map(|k| TraceSample::new(k as f64 * 100.0, k as f64 * 30.0))
///     .collect();
/// let trace = Trace::from_samples("a1", &samples).unwrap();
///
/// let best = find_best_segment(&trace, 5000.0, &SearchConfig::default()).unwrap();
/// assert_eq!(best.duration_seconds, 1500.0);
/// ```
pub fn find_best_segment(trace: &Trace, target_m: f64, config: &SearchConfig) -> Option<Segment> {
    if target_m <= 0.0 {
        return None;
    }

    let distances = trace.distances();
    let times = trace.times();
    let n = distances.len();
    if n < 2 {
        return None;
    }

    let stride = (n / config.max_start_points.max(1)).max(1);

    let mut best: Option<Segment> = None;
    let mut i = 0;

    while i < n {
        let start_distance = distances[i];
        let target_end = start_distance + target_m;

        // First index after i whose cumulative distance covers the target.
        let j = i + 1 + distances[i + 1..].partition_point(|&d| d < target_end);
        if j >= n {
            // The trace never reaches the target from here; with
            // non-decreasing distance, later starts cannot reach it either.
            break;
        }

        let actual = distances[j] - start_distance;
        if (actual - target_m).abs() <= config.tolerance_m {
            let duration = times[j] - times[i];
            let is_faster = best
                .as_ref()
                .map_or(true, |b| duration < b.duration_seconds);
            if is_faster {
                best = Some(Segment {
                    start_index: i,
                    end_index: j,
                    duration_seconds: duration,
                    distance_m: actual,
                    start_distance_m: distances[i],
                    end_distance_m: distances[j],
                });
            }
        }

        i += stride;
    }

    best
}
