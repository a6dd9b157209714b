//! Order-statistics helpers and summary statistics
//!
//! Everything here operates on f64: the model output format carries
//! 12-digit scientific notation, and cycle counts overflow an f32
//! mantissa long before that.

/// Percentile of an ascending-sorted slice via linear interpolation
/// between order statistics.
///
/// `p` is in percent (0..=100). Empty input yields NaN; a single element
/// is its own percentile for every `p`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let index = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Summary statistics over one filtered sample bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
    pub median: f64,
    /// Population standard deviation (divide by n)
    pub stddev: f64,
    /// Population variance (divide by n)
    pub variance: f64,
}

impl Summary {
    /// Compute summary statistics of an ascending-sorted slice.
    ///
    /// Returns `None` for empty input.
    pub fn of_sorted(sorted: &[f64]) -> Option<Self> {
        if sorted.is_empty() {
            return None;
        }

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            max: sorted[sorted.len() - 1],
            mean,
            min: sorted[0],
            median: percentile(sorted, 50.0),
            stddev: variance.sqrt(),
            variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty_is_nan() {
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_percentile_single_element() {
        assert_eq!(percentile(&[7.0], 25.0), 7.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[test]
    fn test_percentile_median_odd() {
        assert_eq!(percentile(&[1.0, 3.0, 5.0, 7.0, 9.0], 50.0), 5.0);
    }

    #[test]
    fn test_percentile_median_even_interpolates() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
    }

    #[test]
    fn test_percentile_quartiles() {
        // 1..=9: index = 0.25 * 8 = 2 exactly, no interpolation
        let seq: Vec<f64> = (1..=9).map(f64::from).collect();
        assert_eq!(percentile(&seq, 25.0), 3.0);
        assert_eq!(percentile(&seq, 75.0), 7.0);
    }

    #[test]
    fn test_percentile_interpolates_between_order_stats() {
        // index = 0.25 * 3 = 0.75 -> 1.0 + 0.75 * (2.0 - 1.0)
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 25.0), 1.75);
    }

    #[test]
    fn test_percentile_extremes() {
        let seq = [2.0, 4.0, 6.0];
        assert_eq!(percentile(&seq, 0.0), 2.0);
        assert_eq!(percentile(&seq, 100.0), 6.0);
    }

    #[test]
    fn test_summary_empty_is_none() {
        assert!(Summary::of_sorted(&[]).is_none());
    }

    #[test]
    fn test_summary_basic_bucket() {
        let s = Summary::of_sorted(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 5.0);
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.median, 3.0);
        assert_eq!(s.variance, 2.0);
        assert!((s.stddev - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_summary_population_variance() {
        // mean=5, variance = (9+1+1+9)/4 = 5 (divide by n, not n-1)
        let s = Summary::of_sorted(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert_eq!(s.variance, 5.0);
    }

    #[test]
    fn test_summary_constant_sequence() {
        let s = Summary::of_sorted(&[4.0, 4.0, 4.0]).unwrap();
        assert_eq!(s.stddev, 0.0);
        assert_eq!(s.variance, 0.0);
        assert_eq!(s.mean, 4.0);
    }

    #[test]
    fn test_summary_single_sample() {
        let s = Summary::of_sorted(&[42.0]).unwrap();
        assert_eq!(s.min, 42.0);
        assert_eq!(s.max, 42.0);
        assert_eq!(s.median, 42.0);
        assert_eq!(s.variance, 0.0);
    }
}
