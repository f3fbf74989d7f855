use crate::config::ConfigErrors;
use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// Relative slack allowed when deciding whether a stepped value still lies
/// within the scan range
const STEP_TOLERANCE: f64 = 1e-9;

/// Inclusive range of job indices, each index doubles as the RNG seed
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JobRange {
    pub start: u64,
    pub end: u64,
}

impl JobRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ConfigErrors> {
        let range = Self { start, end };
        range.validate()?;

        Ok(range)
    }

    pub fn validate(&self) -> Result<(), ConfigErrors> {
        if self.start < 1 {
            Err(ConfigErrors::InvalidRange(format!(
                "the first job index must be >= 1, got {}",
                self.start
            )))
        } else if self.end < self.start {
            Err(ConfigErrors::InvalidRange(format!(
                "the last job index ({}) must be >= the first ({})",
                self.end, self.start
            )))
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> u64 {
        self.end
            .checked_sub(self.start)
            .map_or(0, |width| width.saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }
}

fn default_parameter() -> String {
    "mass".to_string()
}

/// A physics parameter swept over `start..=stop` in steps of `step`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanRange {
    #[serde(default = "default_parameter")]
    pub parameter: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl ScanRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self, ConfigErrors> {
        let scan = Self {
            parameter: default_parameter(),
            start,
            stop,
            step,
        };
        scan.validate()?;

        Ok(scan)
    }

    pub fn validate(&self) -> Result<(), ConfigErrors> {
        if [self.start, self.stop, self.step]
            .iter()
            .any(|value| !value.is_finite() || *value <= 0.0)
        {
            Err(ConfigErrors::InvalidRange(format!(
                "scan.{} needs start, stop and step > 0, got ({}, {}, {})",
                self.parameter, self.start, self.stop, self.step
            )))
        } else if self.stop < self.start {
            Err(ConfigErrors::InvalidRange(format!(
                "scan.{} stop ({}) must be >= start ({})",
                self.parameter, self.stop, self.start
            )))
        } else {
            Ok(())
        }
    }

    /// command line flag the scanned value is passed with
    pub fn flag(&self) -> String {
        format!("--{}", self.parameter)
    }

    pub fn values(&self) -> Frange {
        frange(self.start, self.stop, self.step)
    }
}

/// Float stepper over `start, start + step, ...` inclusive of `stop`.
///
/// Value `k` is computed as `start + k * step` rather than by accumulation, and
/// a value counts as within range if it exceeds `stop` by at most a
/// vanishing fraction of `step`.
#[derive(Clone, Debug)]
pub struct Frange {
    start: f64,
    stop: f64,
    step: f64,
    k: u64,
}

pub fn frange(start: f64, stop: f64, step: f64) -> Frange {
    Frange {
        start,
        stop,
        step,
        k: 0,
    }
}

impl Iterator for Frange {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step.is_nan() || self.step <= 0.0 {
            return None;
        }

        let value = self.start + self.k as f64 * self.step;

        if value <= self.stop + STEP_TOLERANCE * self.step {
            self.k += 1;
            Some(value)
        } else {
            None
        }
    }
}

/// One point of the job space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobPoint {
    pub index: u64,
    pub value: Option<f64>,
}

/// Cross product of a job range with an optional scan
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpace {
    range: JobRange,
    values: Vec<Option<f64>>,
}

impl JobSpace {
    pub fn new(range: JobRange, scan: Option<&ScanRange>) -> Result<Self, ConfigErrors> {
        range.validate()?;

        let values = match scan {
            Some(scan) => {
                scan.validate()?;
                scan.values().map(Some).collect()
            }
            None => vec![None],
        };

        Ok(Self { range, values })
    }

    pub fn range(&self) -> JobRange {
        self.range
    }

    /// scanned values, a single `None` without a scan
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.range.len())
            .unwrap_or(usize::MAX)
            .saturating_mul(self.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// all points, grouped by scanned value and ordered by index within a group
    pub fn iter(&self) -> impl Iterator<Item = JobPoint> + '_ {
        iproduct!(self.values.iter().copied(), self.range.indices())
            .map(|(value, index)| JobPoint { index, value })
    }

    /// the points sharing one scanned value
    pub fn points_for(&self, value: Option<f64>) -> impl Iterator<Item = JobPoint> {
        self.range
            .indices()
            .map(move |index| JobPoint { index, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn frange_includes_stop() {
        assert_eq!(frange(4.0, 8.0, 4.0).collect::<Vec<_>>(), [4.0, 8.0]);
        assert_eq!(frange(1.0, 2.0, 0.5).collect::<Vec<_>>(), [1.0, 1.5, 2.0]);
    }

    #[test]
    fn frange_keeps_the_last_point_of_decimal_steps() {
        // 0.1 * 3 accumulates to 0.30000000000000004
        let values = frange(0.1, 0.4, 0.1).collect::<Vec<_>>();

        assert_eq!(values.len(), 4);
        assert!((values[3] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn frange_single_point() {
        assert_eq!(frange(5.0, 5.0, 1.0).collect::<Vec<_>>(), [5.0]);
    }

    #[test]
    fn invalid_job_ranges() {
        assert!(matches!(JobRange::new(0, 3), Err(ConfigErrors::InvalidRange(_))));
        assert!(matches!(JobRange::new(4, 3), Err(ConfigErrors::InvalidRange(_))));
        assert!(JobRange::new(3, 3).is_ok());
    }

    #[test]
    fn range_length_at_the_limits() {
        assert_eq!(JobRange::new(1, u64::MAX).unwrap().len(), u64::MAX);
        assert_eq!(JobRange::new(u64::MAX, u64::MAX).unwrap().len(), 1);
        assert_eq!(JobRange { start: 5, end: 3 }.len(), 0);

        let space = JobSpace::new(JobRange::new(1, u64::MAX).unwrap(), None).unwrap();
        assert!(!space.is_empty());
    }

    #[test]
    fn invalid_scans() {
        assert!(ScanRange::new(0.0, 3.0, 1.0).is_err());
        assert!(ScanRange::new(1.0, 3.0, 0.0).is_err());
        assert!(ScanRange::new(1.0, 3.0, -1.0).is_err());
        assert!(ScanRange::new(4.0, 3.0, 1.0).is_err());
        assert!(ScanRange::new(1.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn scan_crossed_with_indices() {
        let space = JobSpace::new(
            JobRange::new(1, 2).unwrap(),
            Some(&ScanRange::new(4.0, 8.0, 4.0).unwrap()),
        )
        .unwrap();

        assert_eq!(
            space.iter().collect::<Vec<_>>(),
            [
                JobPoint { index: 1, value: Some(4.0) },
                JobPoint { index: 2, value: Some(4.0) },
                JobPoint { index: 1, value: Some(8.0) },
                JobPoint { index: 2, value: Some(8.0) },
            ]
        );
    }

    #[test]
    fn without_scan_one_point_per_index() {
        let space = JobSpace::new(JobRange::new(1, 3).unwrap(), None).unwrap();

        assert_eq!(space.values(), [None]);
        assert_eq!(
            space.iter().map(|point| point.index).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }

    proptest! {
        #[test]
        fn enumeration_size(lo in 1u64..500, width in 0u64..500, points in 1u32..20) {
            let hi = lo + width;
            let start = 1.0;
            let stop = start + f64::from(points - 1) * 0.25;
            let scan = ScanRange::new(start, stop, 0.25).unwrap();

            let plain = JobSpace::new(JobRange::new(lo, hi).unwrap(), None).unwrap();
            prop_assert_eq!(plain.iter().count() as u64, hi - lo + 1);

            let scanned = JobSpace::new(JobRange::new(lo, hi).unwrap(), Some(&scan)).unwrap();
            prop_assert_eq!(scanned.values().len(), points as usize);
            prop_assert_eq!(scanned.iter().count(), scanned.len());
            prop_assert_eq!(scanned.len() as u64, (hi - lo + 1) * u64::from(points));
        }

        #[test]
        fn frange_bounds(start in 0.01f64..100.0, span in 0.0f64..100.0, step in 0.01f64..10.0) {
            let stop = start + span;
            let values = frange(start, stop, step).collect::<Vec<_>>();

            prop_assert_eq!(values[0], start);
            for value in values {
                prop_assert!(value <= stop + step);
            }
        }
    }
}
