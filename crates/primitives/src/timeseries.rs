//! Time-series container
//!
//! Per-key samples `(timestamp, value, labels)` kept in ascending
//! timestamp order so range queries can binary-search both ends.
//! Timestamps need not be strictly monotonic: duplicates are allowed and
//! late samples are insert-sorted into place.

use monarch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Sample value
    pub value: f64,
    /// Labels attached to the sample
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// An ordered series of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    /// Create an empty series
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample, insert-sorted by timestamp
    ///
    /// A late sample lands before existing samples with a greater
    /// timestamp; equal timestamps keep arrival order.
    pub fn tsadd(
        &mut self,
        timestamp: i64,
        value: f64,
        labels: BTreeMap<String, String>,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::InvalidArgument(
                "sample value must be a finite number".into(),
            ));
        }
        let sample = Sample {
            timestamp,
            value,
            labels,
        };
        let at = self.samples.partition_point(|s| s.timestamp <= timestamp);
        self.samples.insert(at, sample);
        Ok(())
    }

    /// Samples with `from <= timestamp <= to`
    pub fn tsrange(&self, from: i64, to: i64) -> &[Sample] {
        let lo = self.samples.partition_point(|s| s.timestamp < from);
        let hi = self.samples.partition_point(|s| s.timestamp <= to);
        &self.samples[lo..hi.max(lo)]
    }

    /// The most recent sample
    pub fn tsget(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Average value over an optional range; `None` bounds are open
    pub fn tsavg(&self, from: Option<i64>, to: Option<i64>) -> Option<f64> {
        let slice = self.tsrange(from.unwrap_or(i64::MIN), to.unwrap_or(i64::MAX));
        if slice.is_empty() {
            return None;
        }
        Some(slice.iter().map(|s| s.value).sum::<f64>() / slice.len() as f64)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the series holds nothing
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(i64, f64)]) -> TimeSeries {
        let mut ts = TimeSeries::new();
        for (t, v) in points {
            ts.tsadd(*t, *v, BTreeMap::new()).unwrap();
        }
        ts
    }

    #[test]
    fn test_samples_stay_ordered() {
        // Late sample arrives out of order
        let ts = series(&[(10, 1.0), (30, 3.0), (20, 2.0)]);
        let all = ts.tsrange(i64::MIN, i64::MAX);
        let stamps: Vec<i64> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut ts = TimeSeries::new();
        ts.tsadd(10, 1.0, BTreeMap::new()).unwrap();
        ts.tsadd(10, 2.0, BTreeMap::new()).unwrap();
        let all = ts.tsrange(10, 10);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, 1.0);
        assert_eq!(all[1].value, 2.0);
    }

    #[test]
    fn test_range_is_inclusive_both_ends() {
        let ts = series(&[(10, 1.0), (20, 2.0), (30, 3.0)]);
        let mid = ts.tsrange(10, 20);
        assert_eq!(mid.len(), 2);
        assert!(ts.tsrange(11, 19).is_empty());
        assert_eq!(ts.tsrange(30, 99).len(), 1);
    }

    #[test]
    fn test_tsget_is_latest() {
        let ts = series(&[(10, 1.0), (30, 3.0), (20, 2.0)]);
        assert_eq!(ts.tsget().unwrap().timestamp, 30);
        assert!(TimeSeries::new().tsget().is_none());
    }

    #[test]
    fn test_tsavg() {
        let ts = series(&[(10, 1.0), (20, 2.0), (30, 6.0)]);
        assert_eq!(ts.tsavg(None, None), Some(3.0));
        assert_eq!(ts.tsavg(Some(15), None), Some(4.0));
        assert_eq!(ts.tsavg(Some(50), None), None);
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut ts = TimeSeries::new();
        assert!(ts.tsadd(1, f64::NAN, BTreeMap::new()).is_err());
        assert!(ts.is_empty());
    }

    #[test]
    fn test_labels_round_trip() {
        let mut ts = TimeSeries::new();
        let mut labels = BTreeMap::new();
        labels.insert("host".to_string(), "db-1".to_string());
        ts.tsadd(10, 1.0, labels.clone()).unwrap();
        assert_eq!(ts.tsget().unwrap().labels, labels);
        let json = serde_json::to_string(&ts).unwrap();
        let back: TimeSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
