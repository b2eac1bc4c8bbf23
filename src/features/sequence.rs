//! Summary statistics over an activity series (oldest value first).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub len: usize,
    pub mean: f32,
    pub std_dev: f32,
    pub last: f32,
    /// z-score of the last value against the preceding values.
    pub burst_z: f32,
    /// Least-squares slope normalised by the mean (relative growth per step).
    pub trend: f32,
}

impl SequenceStats {
    pub fn from_series(series: &[f32]) -> Self {
        let values: Vec<f32> = series.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len();
        let mean = values.iter().sum::<f32>() / n as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
        let last = values[n - 1];

        let burst_z = if n >= 3 {
            let head = &values[..n - 1];
            let hm = head.iter().sum::<f32>() / head.len() as f32;
            let hv = head.iter().map(|v| (v - hm).powi(2)).sum::<f32>() / head.len() as f32;
            let sd = hv.sqrt().max(1e-3);
            (last - hm) / sd
        } else {
            0.0
        };

        let trend = if n >= 2 && mean.abs() > f32::EPSILON {
            let xm = (n - 1) as f32 / 2.0;
            let mut num = 0.0f32;
            let mut den = 0.0f32;
            for (i, v) in values.iter().enumerate() {
                let dx = i as f32 - xm;
                num += dx * (v - mean);
                den += dx * dx;
            }
            if den > 0.0 {
                (num / den) / mean.abs()
            } else {
                0.0
            }
        } else {
            0.0
        };

        Self {
            len: n,
            mean,
            std_dev: var.sqrt(),
            last,
            burst_z,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_is_default() {
        assert_eq!(SequenceStats::from_series(&[]), SequenceStats::default());
    }

    #[test]
    fn spike_has_high_burst() {
        let s = SequenceStats::from_series(&[1.0, 1.2, 0.9, 1.1, 1.0, 9.0]);
        assert!(s.burst_z > 5.0, "{:?}", s);
        assert_eq!(s.len, 6);
    }

    #[test]
    fn steady_growth_has_positive_trend() {
        let s = SequenceStats::from_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((s.trend - 1.0 / 3.0).abs() < 1e-4, "{:?}", s);
        let flat = SequenceStats::from_series(&[2.0, 2.0, 2.0]);
        assert_eq!(flat.trend, 0.0);
    }

    #[test]
    fn non_finite_values_ignored() {
        let s = SequenceStats::from_series(&[1.0, f32::NAN, 1.0]);
        assert_eq!(s.len, 2);
    }
}
