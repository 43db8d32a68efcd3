//! Inclusive spans of cluster counts.
//!
//! [`ClusterRange`] is always valid (`1 <= min <= max`). Raw user input goes
//! through [`ClusterRange::normalize`], which applies the permissive rules the
//! upload form has always had: an oversized maximum is clamped to the ceiling
//! and an inverted pair is repaired instead of rejected.

use std::fmt;
use std::ops::RangeInclusive;

use tracing::warn;

use crate::error::StyleError;

/// Hard ceiling applied to the requested maximum cluster count.
pub const CLUSTER_CEILING: usize = 20;
/// Form default for the smallest cluster count.
pub const DEFAULT_CLUSTER_MIN: usize = 2;
/// Form default for the largest cluster count.
pub const DEFAULT_CLUSTER_MAX: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterRange {
    min: usize,
    max: usize,
}

impl ClusterRange {
    pub fn new(min: usize, max: usize) -> Result<Self, StyleError> {
        if min == 0 {
            return Err(StyleError::InvalidParameter(
                "cluster count must be at least 1".to_string(),
            ));
        }
        if min > max {
            return Err(StyleError::InvalidParameter(format!(
                "cluster range is inverted ({min} > {max})"
            )));
        }
        Ok(Self { min, max })
    }

    /// Turn raw form values into a usable range.
    ///
    /// Rules, applied in order:
    /// 1. `max` above `ceiling` is clamped to `ceiling`.
    /// 2. If `min > max`, `min` becomes `max(2, max - 1)`.
    /// 3. If `min` is still above `max` (only possible when `max == 1`), `min`
    ///    collapses onto `max`.
    ///
    /// Values below 1 are rejected; they cannot be repaired meaningfully.
    pub fn normalize(min: i64, max: i64, ceiling: usize) -> Result<Self, StyleError> {
        if min < 1 || max < 1 {
            return Err(StyleError::InvalidParameter(format!(
                "cluster counts must be positive (got {min}..={max})"
            )));
        }
        let ceiling = ceiling.max(1) as i64;

        let mut max_adj = max;
        if max_adj > ceiling {
            warn!(requested = max, ceiling, "cluster_max clamped to ceiling");
            max_adj = ceiling;
        }

        let mut min_adj = min;
        if min_adj > max_adj {
            min_adj = (max_adj - 1).max(2);
            if min_adj > max_adj {
                min_adj = max_adj;
            }
            warn!(
                requested_min = min,
                cluster_min = min_adj,
                cluster_max = max_adj,
                "inverted cluster range repaired"
            );
        }

        Self::new(min_adj as usize, max_adj as usize)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.max - self.min + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl Default for ClusterRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_CLUSTER_MIN,
            max: DEFAULT_CLUSTER_MAX,
        }
    }
}

impl fmt::Display for ClusterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

impl IntoIterator for ClusterRange {
    type Item = usize;
    type IntoIter = RangeInclusive<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_and_inverted() {
        assert!(ClusterRange::new(0, 4).is_err());
        assert!(ClusterRange::new(5, 4).is_err());
        assert!(ClusterRange::new(4, 4).is_ok());
    }

    #[test]
    fn normalize_keeps_valid_ranges() {
        let range = ClusterRange::normalize(2, 8, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (2, 8));
        assert_eq!(range.len(), 7);
    }

    #[test]
    fn normalize_clamps_max_to_ceiling() {
        let range = ClusterRange::normalize(3, 50, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (3, 20));
    }

    #[test]
    fn normalize_repairs_inverted_pair() {
        // 5 is under the ceiling, so only the minimum moves: max(2, 5 - 1) = 4.
        let range = ClusterRange::normalize(10, 5, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (4, 5));
    }

    #[test]
    fn normalize_clamps_then_repairs() {
        let range = ClusterRange::normalize(40, 30, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (19, 20));
    }

    #[test]
    fn normalize_small_max_uses_floor_of_two() {
        let range = ClusterRange::normalize(9, 2, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (2, 2));

        let range = ClusterRange::normalize(9, 1, CLUSTER_CEILING).unwrap();
        assert_eq!((range.min(), range.max()), (1, 1));
    }

    #[test]
    fn normalize_rejects_non_positive_values() {
        assert!(matches!(
            ClusterRange::normalize(0, 4, CLUSTER_CEILING),
            Err(StyleError::InvalidParameter(_))
        ));
        assert!(ClusterRange::normalize(2, -3, CLUSTER_CEILING).is_err());
    }

    #[test]
    fn iterates_every_cluster_count() {
        let range = ClusterRange::new(3, 6).unwrap();
        assert_eq!(range.into_iter().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert_eq!(range.to_string(), "3..=6");
    }
}
