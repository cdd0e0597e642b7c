//! Latency statistics over duration samples in milliseconds.

use serde::{Deserialize, Serialize};

/// Default number of histogram bins.
pub const DEFAULT_BINS: usize = 20;

/// Upper bound on histogram bins; larger requests are clamped.
pub const MAX_BINS: usize = 1000;

/// Order statistics of a set of durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_jobs: usize,
    pub average: i64,
    pub median: i64,
    pub q25: i64,
    pub q75: i64,
    pub min: i64,
    pub max: i64,
}

impl Summary {
    /// Summarize samples; `None` when there are none.
    pub fn from_millis(samples: &[i64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();

        let sum: i128 = sorted.iter().map(|&v| v as i128).sum();
        let average = (sum / n as i128) as i64;

        let median = if n % 2 == 0 {
            ((sorted[n / 2 - 1] as i128 + sorted[n / 2] as i128) / 2) as i64
        } else {
            sorted[n / 2]
        };

        Some(Self {
            total_jobs: n,
            average,
            median,
            q25: sorted[n / 4],
            q75: sorted[n * 3 / 4],
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

/// One equal-width histogram bucket, `[lower, upper)` except the last which is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bins: Vec<Bin>,
}

impl Histogram {
    /// Bucket samples into `bins` equal-width bins spanning `[min, max]`.
    ///
    /// `bins` is clamped to `1..=MAX_BINS`.
    pub fn from_millis(samples: &[i64], bins: usize) -> Option<Self> {
        let min = *samples.iter().min()?;
        let max = *samples.iter().max()?;
        let bins = bins.clamp(1, MAX_BINS);

        let width = (max - min) as f64 / bins as f64;
        let mut out: Vec<Bin> = (0..bins)
            .map(|i| Bin {
                lower: min as f64 + i as f64 * width,
                upper: min as f64 + (i + 1) as f64 * width,
                count: 0,
            })
            .collect();

        for &sample in samples {
            let idx = if width == 0.0 {
                0
            } else {
                (((sample - min) as f64 / width) as usize).min(bins - 1)
            };
            out[idx].count += 1;
        }

        Some(Self { bins: out })
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_empty() {
        assert!(Summary::from_millis(&[]).is_none());
    }

    #[test]
    fn test_summary_odd_count() {
        let s = Summary::from_millis(&[50, 10, 40, 20, 30]).unwrap();
        assert_eq!(s.total_jobs, 5);
        assert_eq!(s.average, 30);
        assert_eq!(s.median, 30);
        assert_eq!(s.q25, 20);
        assert_eq!(s.q75, 40);
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 50);
    }

    #[test]
    fn test_summary_even_count_median_averages_middle_pair() {
        let s = Summary::from_millis(&[40, 10, 30, 20]).unwrap();
        assert_eq!(s.median, 25);
        assert_eq!(s.q25, 20);
        assert_eq!(s.q75, 40);
    }

    #[test]
    fn test_summary_handles_negative_samples() {
        let s = Summary::from_millis(&[-100, 100]).unwrap();
        assert_eq!(s.average, 0);
        assert_eq!(s.min, -100);
    }

    #[test]
    fn test_histogram_counts_every_sample() {
        let samples: Vec<i64> = (0..100).collect();
        let h = Histogram::from_millis(&samples, DEFAULT_BINS).unwrap();
        assert_eq!(h.bins.len(), DEFAULT_BINS);
        assert_eq!(h.total(), 100);
        // the maximum lands in the last, closed bin
        assert!(h.bins.last().unwrap().count > 0);
    }

    #[test]
    fn test_histogram_single_value() {
        let h = Histogram::from_millis(&[7, 7, 7], 4).unwrap();
        assert_eq!(h.bins[0].count, 3);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn test_histogram_bin_count_is_clamped() {
        let h = Histogram::from_millis(&[1, 2, 3], usize::MAX).unwrap();
        assert_eq!(h.bins.len(), MAX_BINS);
        assert_eq!(h.total(), 3);

        let h = Histogram::from_millis(&[1, 2, 3], 0).unwrap();
        assert_eq!(h.bins.len(), 1);
    }

    #[test]
    fn test_histogram_empty() {
        assert!(Histogram::from_millis(&[], 10).is_none());
    }
}
