//! Shares-outstanding series cleaning.
//!
//! Vendor share counts occasionally contain a single-period spike that
//! reverts on the next report. Such points are detected from consecutive
//! log returns, dropped, and refilled by linear interpolation.

use chrono::NaiveDate;
use tracing::debug;

/// One observation of shares outstanding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharesPoint {
    /// Reporting date.
    pub date: NaiveDate,
    /// Shares outstanding; `NaN` when unknown.
    pub shares: f64,
}

impl SharesPoint {
    /// Creates an observation.
    #[must_use]
    pub const fn new(date: NaiveDate, shares: f64) -> Self {
        Self { date, shares }
    }
}

/// Removes spurious single-point jumps from a shares series.
///
/// The input is sorted by date first. A point `i` with neighbours on both
/// sides is flagged when, with `r[i] = ln(s[i] / s[i-1])`,
/// `|r[i] + r[i+1]| < (|r[i]| + |r[i+1]|) / 4`: the move into the point and
/// the move out of it largely cancel. Flagged points, and points that were
/// already `NaN`, are refilled by linear interpolation between the nearest
/// finite neighbours. Points without finite values on both sides stay `NaN`.
#[must_use]
pub fn clean_shares_series(raw: &[SharesPoint]) -> Vec<SharesPoint> {
    let mut points = raw.to_vec();
    points.sort_by_key(|point| point.date);

    let returns = log_returns(&points);
    let mut flagged = 0usize;
    for i in 1..points.len().saturating_sub(1) {
        let (into, out_of) = (returns[i], returns[i + 1]);
        let avg_abs = (into.abs() + out_of.abs()) / 2.0;
        let sum_abs = (into + out_of).abs();
        if sum_abs < avg_abs / 2.0 {
            points[i].shares = f64::NAN;
            flagged += 1;
        }
    }
    if flagged > 0 {
        debug!(flagged, "Dropped spurious share count jumps");
    }

    let mut values: Vec<f64> = points.iter().map(|point| point.shares).collect();
    interpolate_linear(&mut values);
    for (point, value) in points.iter_mut().zip(values) {
        point.shares = value;
    }
    points
}

/// `r[0]` is `NaN`; `r[i] = ln(s[i] / s[i-1])`, `NaN` across a zero count.
fn log_returns(points: &[SharesPoint]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(points.len());
    if !points.is_empty() {
        returns.push(f64::NAN);
    }
    for pair in points.windows(2) {
        let (prev, cur) = (pair[0].shares, pair[1].shares);
        let r = if prev == 0.0 || cur == 0.0 {
            f64::NAN
        } else {
            (cur / prev).ln()
        };
        returns.push(r);
    }
    returns
}

/// Fills non-finite values lying between two finite values, linearly in position.
fn interpolate_linear(values: &mut [f64]) {
    let mut last_finite: Option<usize> = None;
    for i in 0..values.len() {
        if !values[i].is_finite() {
            continue;
        }
        if let Some(left) = last_finite {
            let gap = i - left;
            if gap > 1 {
                let (start, end) = (values[left], values[i]);
                for (step, slot) in values[left + 1..i].iter_mut().enumerate() {
                    let weight = (step + 1) as f64 / gap as f64;
                    *slot = start + (end - start) * weight;
                }
            }
        }
        last_finite = Some(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<SharesPoint> {
        let start = NaiveDate::from_ymd_opt(2020, 3, 31).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &shares)| {
                SharesPoint::new(start + chrono::Months::new(3 * i as u32), shares)
            })
            .collect()
    }

    fn shares(points: &[SharesPoint]) -> Vec<f64> {
        points.iter().map(|p| p.shares).collect()
    }

    #[test]
    fn test_single_point_spike_replaced() {
        let cleaned = clean_shares_series(&series(&[100.0, 102.0, 50.0, 101.0, 103.0]));
        let values = shares(&cleaned);
        assert!((values[2] - 101.5).abs() < 1e-9);
        assert_eq!(values[0], 100.0);
        assert_eq!(values[1], 102.0);
        assert_eq!(values[3], 101.0);
        assert_eq!(values[4], 103.0);
    }

    #[test]
    fn test_upward_spike_replaced() {
        let values = shares(&clean_shares_series(&series(&[100.0, 300.0, 100.0])));
        assert!((values[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_smooth_series_unchanged() {
        let raw = series(&[100.0, 101.0, 102.5, 103.0, 104.2]);
        let cleaned = clean_shares_series(&raw);
        assert_eq!(cleaned, raw);
        assert_eq!(clean_shares_series(&cleaned), cleaned);
    }

    #[test]
    fn test_sustained_level_change_kept() {
        // A split doubles the count and stays there.
        let raw = series(&[100.0, 100.0, 200.0, 200.0, 201.0]);
        assert_eq!(clean_shares_series(&raw), raw);
    }

    #[test]
    fn test_endpoints_never_flagged() {
        let raw = series(&[50.0, 100.0, 101.0, 200.0]);
        assert_eq!(clean_shares_series(&raw), raw);
    }

    #[test]
    fn test_zero_counts_are_not_finite_returns() {
        let raw = series(&[100.0, 0.0, 100.0]);
        assert_eq!(clean_shares_series(&raw), raw);
    }

    #[test]
    fn test_unbracketed_gaps_stay_nan() {
        let values = shares(&clean_shares_series(&series(&[f64::NAN, 100.0, f64::NAN, 110.0, f64::NAN])));
        assert!(values[0].is_nan());
        assert!((values[2] - 105.0).abs() < 1e-9);
        assert!(values[4].is_nan());
    }

    #[test]
    fn test_input_sorted_by_date() {
        let mut raw = series(&[100.0, 102.0, 50.0, 101.0, 103.0]);
        raw.reverse();
        let cleaned = clean_shares_series(&raw);
        assert!(cleaned.windows(2).all(|w| w[0].date < w[1].date));
        assert!((cleaned[2].shares - 101.5).abs() < 1e-9);
    }

    #[test]
    fn test_short_series() {
        assert!(clean_shares_series(&[]).is_empty());
        let single = series(&[42.0]);
        assert_eq!(clean_shares_series(&single), single);
    }
}
