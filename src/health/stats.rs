use super::ExecutionSample;
use chrono::Duration;

/// Run-time aggregates over a flow's recent successful executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStatistics {
    /// Duration of the first finished sample in caller order.
    pub last: Duration,
    /// Mean duration, rounded to the nearest millisecond.
    pub average: Duration,
    pub max: Duration,
}

impl Default for RuntimeStatistics {
    fn default() -> Self {
        Self {
            last: Duration::zero(),
            average: Duration::zero(),
            max: Duration::zero(),
        }
    }
}

impl RuntimeStatistics {
    /// Compute statistics from samples ordered most-recent-first.
    ///
    /// Only samples with both a start and an end contribute. Malformed
    /// samples (end without start, end before start) are skipped.
    pub fn compute(samples: &[ExecutionSample]) -> Self {
        let durations: Vec<i64> = samples
            .iter()
            .filter_map(ExecutionSample::duration)
            .map(|d| d.num_milliseconds())
            .collect();

        let Some(&last) = durations.first() else {
            return Self::default();
        };

        let total: i64 = durations.iter().sum();
        let average = (total as f64 / durations.len() as f64).round() as i64;
        let max = durations.iter().copied().max().unwrap_or(0);

        Self {
            last: Duration::milliseconds(last),
            average: Duration::milliseconds(average),
            max: Duration::milliseconds(max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Status;
    use chrono::{DateTime, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn finished(offset_ms: i64, duration_ms: i64) -> ExecutionSample {
        let start = base() + Duration::milliseconds(offset_ms);
        ExecutionSample::new(
            Some(start),
            Some(start + Duration::milliseconds(duration_ms)),
            Status::Succeeded,
        )
    }

    #[test]
    fn test_empty_history_is_all_zero() {
        assert_eq!(RuntimeStatistics::compute(&[]), RuntimeStatistics::default());
    }

    #[test]
    fn test_unfinished_samples_are_ignored() {
        let samples = vec![
            ExecutionSample::new(Some(base()), None, Status::Running),
            ExecutionSample::new(None, None, Status::Preparing),
            ExecutionSample::new(None, Some(base()), Status::Succeeded),
        ];
        assert_eq!(RuntimeStatistics::compute(&samples), RuntimeStatistics::default());
    }

    #[test]
    fn test_last_average_max() {
        // most recent first: 100, 200, 300
        let samples = vec![finished(3000, 100), finished(2000, 200), finished(1000, 300)];
        let stats = RuntimeStatistics::compute(&samples);
        assert_eq!(stats.last, Duration::milliseconds(100));
        assert_eq!(stats.average, Duration::milliseconds(200));
        assert_eq!(stats.max, Duration::milliseconds(300));
    }

    #[test]
    fn test_last_skips_leading_unfinished_sample() {
        let samples = vec![
            ExecutionSample::new(Some(base()), None, Status::Running),
            finished(0, 750),
            finished(0, 250),
        ];
        assert_eq!(RuntimeStatistics::compute(&samples).last, Duration::milliseconds(750));
    }

    #[test]
    fn test_average_rounds_half_up() {
        // (1 + 2) / 2 = 1.5 -> 2
        let samples = vec![finished(0, 1), finished(0, 2)];
        assert_eq!(RuntimeStatistics::compute(&samples).average, Duration::milliseconds(2));

        // (1 + 1 + 2) / 3 = 1.33 -> 1
        let samples = vec![finished(0, 1), finished(0, 1), finished(0, 2)];
        assert_eq!(RuntimeStatistics::compute(&samples).average, Duration::milliseconds(1));
    }

    #[test]
    fn test_end_before_start_is_excluded() {
        let start = base();
        let samples = vec![
            ExecutionSample::new(Some(start), Some(start - Duration::seconds(5)), Status::Succeeded),
            finished(0, 400),
        ];
        let stats = RuntimeStatistics::compute(&samples);
        assert_eq!(stats.last, Duration::milliseconds(400));
        assert_eq!(stats.average, Duration::milliseconds(400));
        assert_eq!(stats.max, Duration::milliseconds(400));
    }
}
