//! Dynamic bounds: rate-of-change window clipped to the global range

use crate::config::defaults::{LOWER_CLIP_EPSILON, UPPER_WIDENING};
use crate::types::{ControlVariable, DynamicBounds};

/// Clipping and widening constants applied by [`compute_dynamic_bounds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsPolicy {
    /// Subtracted from `hi` (or added to `lo`) when a window endpoint lands
    /// on the wrong side of the global range.
    pub lower_clip_epsilon: f64,
    /// Added to every upper bound after clipping.
    pub upper_widening: f64,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        Self {
            lower_clip_epsilon: LOWER_CLIP_EPSILON,
            upper_widening: UPPER_WIDENING,
        }
    }
}

/// Feasible interval for one variable given its last observed value.
///
/// 1. Nominal window `last ± |last * rate|`
/// 2. Lower end: below `lo` -> `lo`, above `hi` -> `hi - ε`
/// 3. Upper end: below `lo` -> `lo + ε`, above `hi` -> `hi`
/// 4. Upper end widened by `ε'`
///
/// A zero rate or zero last value collapses the window to a point; step 4
/// still leaves a strictly positive width. The result always lies within
/// `[lo, hi + ε']`. A non-finite `last_value` yields non-finite bounds,
/// which the worker reports as a degenerate interval.
pub fn compute_dynamic_bounds(
    last_value: f64,
    variable: &ControlVariable,
    policy: &BoundsPolicy,
) -> DynamicBounds {
    let (lo, hi) = (variable.lo, variable.hi);
    let delta = (last_value * variable.rate).abs();

    let mut min_b = last_value - delta;
    let mut max_b = last_value + delta;

    if min_b < lo {
        min_b = lo;
    } else if min_b > hi {
        min_b = hi - policy.lower_clip_epsilon;
    }

    if max_b < lo {
        max_b = lo + policy.lower_clip_epsilon;
    } else if max_b > hi {
        max_b = hi;
    }

    DynamicBounds {
        min_b,
        max_b: max_b + policy.upper_widening,
    }
}

/// Bounds for every control variable of one operating point.
pub fn bounds_for_record(
    last_values: &[f64],
    variables: &[ControlVariable],
    policy: &BoundsPolicy,
) -> Vec<DynamicBounds> {
    last_values
        .iter()
        .zip(variables)
        .map(|(&last, var)| compute_dynamic_bounds(last, var, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(lo: f64, hi: f64, rate: f64) -> ControlVariable {
        ControlVariable {
            name: "X".to_string(),
            lo,
            hi,
            rate,
        }
    }

    #[test]
    fn window_inside_global_range() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(50.0, &var(0.0, 100.0, 0.1), &policy);
        assert!((b.min_b - 45.0).abs() < 1e-12);
        assert!((b.max_b - (55.0 + UPPER_WIDENING)).abs() < 1e-12);
    }

    #[test]
    fn window_clipped_to_global_range() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(95.0, &var(0.0, 100.0, 0.1), &policy);
        assert!((b.min_b - 85.5).abs() < 1e-12);
        assert!((b.max_b - (100.0 + UPPER_WIDENING)).abs() < 1e-12);

        let b = compute_dynamic_bounds(1.0, &var(5.0, 100.0, 0.5), &policy);
        assert_eq!(b.min_b, 5.0);
        assert!((b.max_b - (5.0 + LOWER_CLIP_EPSILON + UPPER_WIDENING)).abs() < 1e-12);
    }

    #[test]
    fn last_value_above_range_keeps_order() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(150.0, &var(0.0, 100.0, 0.1), &policy);
        assert!((b.min_b - (100.0 - LOWER_CLIP_EPSILON)).abs() < 1e-12);
        assert!(b.min_b < b.max_b);
    }

    #[test]
    fn zero_rate_on_global_bound_has_positive_width() {
        let policy = BoundsPolicy::default();
        for last in [0.0, 100.0] {
            let b = compute_dynamic_bounds(last, &var(0.0, 100.0, 0.0), &policy);
            assert!(b.is_valid(), "degenerate interval for last={last}: {b:?}");
            assert!(b.width() > 0.0);
        }
    }

    #[test]
    fn zero_last_value_has_positive_width() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(0.0, &var(-10.0, 10.0, 0.3), &policy);
        assert_eq!(b.min_b, 0.0);
        assert!((b.max_b - UPPER_WIDENING).abs() < 1e-12);
    }

    #[test]
    fn negative_last_value_window_is_ordered() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(-20.0, &var(-100.0, 0.0, 0.1), &policy);
        assert!((b.min_b + 22.0).abs() < 1e-12);
        assert!((b.max_b - (-18.0 + UPPER_WIDENING)).abs() < 1e-12);
    }

    #[test]
    fn bounds_always_strict_and_contained() {
        let policy = BoundsPolicy::default();
        let variable = var(10.0, 60.0, 0.2);
        let mut last = -50.0;
        while last <= 150.0 {
            let b = compute_dynamic_bounds(last, &variable, &policy);
            assert!(b.min_b < b.max_b, "last={last}: {b:?}");
            assert!(b.min_b >= variable.lo - policy.lower_clip_epsilon);
            assert!(b.max_b <= variable.hi + policy.upper_widening + 1e-12);
            last += 0.5;
        }
    }

    #[test]
    fn nan_last_value_is_not_valid() {
        let policy = BoundsPolicy::default();
        let b = compute_dynamic_bounds(f64::NAN, &var(0.0, 1.0, 0.1), &policy);
        assert!(!b.is_valid());
    }
}
