use serde::Serialize;

use super::key::Statistic;

/// Summary of one bucket's samples, all taken from the same snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min: u64,
    pub max: u64,
    /// Arithmetic mean, unrounded.
    pub average: f64,
    pub count: u64,
}

impl LatencyStats {
    /// `None` for an empty bucket: there is nothing to report.
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        let (&first, rest) = samples.split_first()?;

        let mut min = first;
        let mut max = first;
        // u128 so a long cycle of large samples cannot overflow the sum
        let mut sum = first as u128;
        for &ms in rest {
            min = min.min(ms);
            max = max.max(ms);
            sum += ms as u128;
        }

        let count = samples.len() as u64;
        Some(Self {
            min,
            max,
            average: sum as f64 / count as f64,
            count,
        })
    }

    pub fn value(&self, stat: Statistic) -> f64 {
        match stat {
            Statistic::Min => self.min as f64,
            Statistic::Max => self.max as f64,
            Statistic::Average => self.average,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_stats() {
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn min_max_average() {
        let s = LatencyStats::from_samples(&[20, 10, 30]).unwrap();
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 30);
        assert_eq!(s.average, 20.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.value(Statistic::Min), 10.0);
        assert_eq!(s.value(Statistic::Max), 30.0);
        assert_eq!(s.value(Statistic::Average), 20.0);
    }

    #[test]
    fn average_keeps_fraction() {
        let s = LatencyStats::from_samples(&[1, 2]).unwrap();
        assert_eq!(s.average, 1.5);

        let s = LatencyStats::from_samples(&[1, 1, 2]).unwrap();
        assert_eq!(s.average, 4.0 / 3.0);
    }

    #[test]
    fn single_sample() {
        let s = LatencyStats::from_samples(&[0]).unwrap();
        assert_eq!((s.min, s.max, s.average, s.count), (0, 0, 0.0, 1));
    }

    #[test]
    fn large_samples_do_not_overflow() {
        let s = LatencyStats::from_samples(&[u64::MAX, u64::MAX]).unwrap();
        assert_eq!(s.max, u64::MAX);
        assert_eq!(s.average, u64::MAX as f64);
    }
}
