//! Statistical reduction of raw time-series samples
//!
//! CPU samples are cumulative usage counters (core-seconds) and are turned
//! into a rate series before reduction; memory samples are instantaneous
//! levels reduced directly. CPU reports the mean rate, memory the mode.

use crate::error::{Error, Result};
use crate::models::{MetricKind, Point, UsageStats};
use std::collections::BTreeMap;

/// Reduce `points` according to the semantics of `kind`
pub fn summarize(kind: MetricKind, points: Vec<Point>) -> Result<UsageStats> {
    match kind {
        MetricKind::Cpu => summarize_cpu(points),
        MetricKind::Memory => summarize_memory(points),
    }
}

/// Summarize cumulative CPU counters as milli-core rates.
///
/// `data_points` counts raw samples, not derived rates. Extremes, last and
/// mean are computed on the unrounded rate series and then rounded
/// half-to-even to whole milli-cores, so `min <= central <= max` holds.
pub fn summarize_cpu(mut points: Vec<Point>) -> Result<UsageStats> {
    if points.is_empty() {
        return Err(Error::InsufficientData);
    }
    sort_by_time(&mut points);

    let rates = rate_series(&points)?;
    let last = *rates.last().ok_or(Error::InsufficientData)?;
    if rates.iter().any(|r| !r.is_finite()) {
        return Err(Error::MalformedResponse("non-finite CPU counter value".into()));
    }

    let (min, max) = rates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(r), hi.max(r))
        });
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;

    Ok(UsageStats {
        last: to_millis(last),
        min: to_millis(min),
        max: to_millis(max),
        central: to_millis(mean.clamp(min, max)),
        data_points: points.len() as u64,
    })
}

/// Summarize memory levels in bytes; `central` is the mode
pub fn summarize_memory(mut points: Vec<Point>) -> Result<UsageStats> {
    if points.is_empty() {
        return Err(Error::InsufficientData);
    }
    sort_by_time(&mut points);

    let mut frequencies: BTreeMap<i64, usize> = BTreeMap::new();
    for point in &points {
        *frequencies.entry(point.value.as_i64()).or_default() += 1;
    }

    let (&min, _) = frequencies.first_key_value().ok_or(Error::InsufficientData)?;
    let (&max, _) = frequencies.last_key_value().ok_or(Error::InsufficientData)?;
    let central = mode(&frequencies).ok_or(Error::InsufficientData)?;
    let last = points
        .last()
        .map(|p| p.value.as_i64())
        .ok_or(Error::InsufficientData)?;

    Ok(UsageStats {
        last,
        min,
        max,
        central,
        data_points: points.len() as u64,
    })
}

/// Most frequent value; ties go to the smallest value
pub fn mode(frequencies: &BTreeMap<i64, usize>) -> Option<i64> {
    let mut best: Option<(i64, usize)> = None;
    for (&value, &count) in frequencies {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value)
}

/// First-difference rates in milli-cores of time-ordered cumulative samples.
///
/// Returns `len - 1` rates. A non-increasing timestamp is an input error. A
/// decreasing counter is taken as a reset, and the post-reset value is used
/// as the increase for that interval.
pub fn rate_series(points: &[Point]) -> Result<Vec<f64>> {
    points
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            let seconds = elapsed_seconds(prev, cur);
            if seconds <= 0.0 {
                return Err(Error::ZeroInterval { at: cur.end_time });
            }

            let (before, after) = (prev.value.as_f64(), cur.value.as_f64());
            let delta = if after >= before { after - before } else { after };
            Ok(delta / seconds * 1000.0)
        })
        .collect()
}

fn elapsed_seconds(prev: &Point, cur: &Point) -> f64 {
    let interval = cur.end_time - prev.end_time;
    match interval.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => interval.num_seconds() as f64,
    }
}

// Stable, so equal timestamps keep arrival order.
fn sort_by_time(points: &mut [Point]) {
    points.sort_by_key(|p| p.end_time);
}

fn to_millis(value: f64) -> i64 {
    value.round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Deterministic xorshift generator for table-free sweeps
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn test_cpu_rates_from_counters() {
        // 0.5 cores for a minute, then 1 core for a minute
        let points = vec![
            Point::double(at(0), 100.0),
            Point::double(at(60), 130.0),
            Point::double(at(120), 190.0),
        ];

        let stats = summarize_cpu(points).unwrap();

        assert_eq!(stats.data_points, 3);
        assert_eq!(stats.min, 500);
        assert_eq!(stats.max, 1000);
        assert_eq!(stats.central, 750);
        assert_eq!(stats.last, 1000);
    }

    #[test]
    fn test_cpu_unordered_input_is_sorted() {
        let points = vec![
            Point::double(at(120), 190.0),
            Point::double(at(0), 100.0),
            Point::double(at(60), 130.0),
        ];

        let stats = summarize_cpu(points).unwrap();
        assert_eq!(stats.last, 1000);
        assert_eq!(stats.min, 500);
    }

    #[test]
    fn test_cpu_counter_reset() {
        let points = vec![
            Point::double(at(0), 500.0),
            Point::double(at(10), 505.0),
            Point::double(at(20), 2.0),
        ];

        let rates = rate_series(&points).unwrap();
        assert_eq!(rates, vec![500.0, 200.0]);
    }

    #[test]
    fn test_cpu_zero_interval_is_an_error() {
        let points = vec![
            Point::double(at(0), 1.0),
            Point::double(at(0), 2.0),
        ];

        match summarize_cpu(points) {
            Err(Error::ZeroInterval { at: when }) => assert_eq!(when, at(0)),
            other => panic!("expected ZeroInterval, got {:?}", other),
        }
    }

    #[test]
    fn test_cpu_single_sample_is_insufficient() {
        let result = summarize_cpu(vec![Point::double(at(0), 1.0)]);
        assert!(matches!(result, Err(Error::InsufficientData)));
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        assert!(matches!(summarize_cpu(vec![]), Err(Error::InsufficientData)));
        assert!(matches!(summarize_memory(vec![]), Err(Error::InsufficientData)));
    }

    #[test]
    fn test_cpu_sweep_rate_count_and_bounds() {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);

        for n in 2..60usize {
            let mut t = 0i64;
            let mut counter = 0.0f64;
            let mut points = Vec::with_capacity(n);
            for _ in 0..n {
                t += 1 + (rng.next() % 120) as i64;
                counter += (rng.next() % 10_000) as f64 / 137.0;
                points.push(Point::double(at(t), counter));
            }

            assert_eq!(rate_series(&points).unwrap().len(), n - 1);

            let stats = summarize_cpu(points).unwrap();
            assert_eq!(stats.data_points, n as u64);
            assert!(stats.min <= stats.central, "n={n} {stats:?}");
            assert!(stats.central <= stats.max, "n={n} {stats:?}");
        }
    }

    #[test]
    fn test_cpu_sub_second_intervals() {
        let start = at(0);
        let points = vec![
            Point::double(start, 0.0),
            Point::double(start + Duration::milliseconds(500), 0.25),
        ];

        let stats = summarize_cpu(points).unwrap();
        assert_eq!(stats.max, 500);
    }

    #[test]
    fn test_memory_summary() {
        let points = vec![
            Point::int(at(0), 300),
            Point::int(at(10), 100),
            Point::int(at(20), 300),
            Point::int(at(30), 200),
        ];

        let stats = summarize_memory(points).unwrap();

        assert_eq!(stats.min, 100);
        assert_eq!(stats.max, 300);
        assert_eq!(stats.central, 300);
        assert_eq!(stats.last, 200);
        assert_eq!(stats.data_points, 4);
    }

    #[test]
    fn test_memory_last_is_most_recent_timestamp() {
        let points = vec![
            Point::int(at(30), 42),
            Point::int(at(0), 7),
            Point::int(at(10), 9),
        ];

        assert_eq!(summarize_memory(points).unwrap().last, 42);
    }

    #[test]
    fn test_memory_mode_tie_prefers_smallest_in_any_order() {
        let values = [500i64, 100, 500, 100, 900];
        let mut rng = XorShift(42);

        for _ in 0..50 {
            let mut shuffled = values.to_vec();
            for i in (1..shuffled.len()).rev() {
                let j = (rng.next() % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }
            let points = shuffled
                .iter()
                .enumerate()
                .map(|(i, &v)| Point::int(at(i as i64), v))
                .collect();

            assert_eq!(summarize_memory(points).unwrap().central, 100);
        }
    }

    #[test]
    fn test_mode_strictly_highest_frequency_wins() {
        let frequencies: BTreeMap<i64, usize> = [(1, 2), (5, 3), (9, 1)].into_iter().collect();
        assert_eq!(mode(&frequencies), Some(5));
        assert_eq!(mode(&BTreeMap::new()), None);
    }

    #[test]
    fn test_summarize_dispatches_on_kind() {
        let points = vec![Point::int(at(0), 10), Point::int(at(5), 20)];
        let memory = summarize(MetricKind::Memory, points.clone()).unwrap();
        let cpu = summarize(MetricKind::Cpu, points).unwrap();

        assert_eq!(memory.central, 10);
        assert_eq!(cpu.central, 2000);
    }
}
