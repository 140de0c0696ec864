//! Segmentation of per-sample sequences into index ranges.

use core::ops::{Range, RangeInclusive};

/// Inclusive index ranges of consecutive samples satisfying `pred`.
pub fn ranges_where<T>(values: &[T], mut pred: impl FnMut(&T) -> bool) -> Vec<RangeInclusive<usize>> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (i, v) in values.iter().enumerate() {
        match (pred(v), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                ranges.push(s..=i - 1);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push(s..=values.len() - 1);
    }
    ranges
}

/// Inclusive index ranges where `mask` is positive. Applied to a static
/// mask this yields settling and static samples together.
pub fn active_ranges(mask: &[f64]) -> Vec<RangeInclusive<usize>> {
    ranges_where(mask, |&m| m > 0.0)
}

/// Splits `values` into half-open runs of equal value. The runs cover
/// every index exactly once; an empty input yields no runs.
pub fn value_runs<T: PartialEq>(values: &[T]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for (i, pair) in values.windows(2).enumerate() {
        if pair[0] != pair[1] {
            runs.push(start..i + 1);
            start = i + 1;
        }
    }
    if !values.is_empty() {
        runs.push(start..values.len());
    }
    runs
}
