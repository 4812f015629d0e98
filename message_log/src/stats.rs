use serde::Serialize;

/// Descriptive statistics over a fixed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl SummaryStats {
    /// [None] for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };

        Some(Self {
            count,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            median,
            std: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample() {
        assert_eq!(SummaryStats::from_samples(&[]), None);
    }

    #[test]
    fn single_value() {
        let stats = SummaryStats::from_samples(&[0.25]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 0.25);
        assert_eq!(stats.median, 0.25);
        assert_eq!(stats.std, 0.0);
    }

    #[test]
    fn odd_sample() {
        let stats = SummaryStats::from_samples(&[9.0, 1.0, 5.0]).unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.mean, 5.0);
    }

    #[test]
    fn even_sample() {
        let stats = SummaryStats::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.median, 4.5);
        assert_eq!(stats.std, 2.0);
    }

    #[test]
    fn negative_values_are_kept() {
        let stats = SummaryStats::from_samples(&[-1.0, 3.0]).unwrap();
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.mean, 1.0);
    }
}
