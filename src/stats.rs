//! Descriptive statistics over numeric slices.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkewDirection {
    Right,
    Left,
    Symmetric,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut accumulator = StatsAccumulator::default();
        for value in values {
            accumulator.add(*value);
        }
        accumulator.finish()
    }

    /// Mean-vs-median heuristic: a gap above a tenth of a standard deviation is a skew.
    pub fn skew(&self) -> SkewDirection {
        if self.std_dev <= f64::EPSILON {
            return SkewDirection::Symmetric;
        }
        let gap = (self.mean - self.median) / self.std_dev;
        if gap > 0.1 {
            SkewDirection::Right
        } else if gap < -0.1 {
            SkewDirection::Left
        } else {
            SkewDirection::Symmetric
        }
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    values: Vec<f64>,
    sum: f64,
    sum_squares: f64,
}

impl StatsAccumulator {
    fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.sum += value;
        self.sum_squares += value * value;
        self.values.push(value);
    }

    fn finish(mut self) -> Option<Summary> {
        if self.values.is_empty() {
            return None;
        }
        self.values.sort_by(f64::total_cmp);
        let count = self.values.len();
        let mean = self.sum / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let variance =
                (self.sum_squares - count as f64 * mean * mean) / (count as f64 - 1.0);
            variance.max(0.0).sqrt()
        };
        Some(Summary {
            count,
            sum: self.sum,
            mean,
            median: percentile_sorted(&self.values, 50.0),
            std_dev,
            min: self.values[0],
            max: self.values[count - 1],
            q1: percentile_sorted(&self.values, 25.0),
            q3: percentile_sorted(&self.values, 75.0),
        })
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation; zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    if values.len() < 2 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

/// Linear-interpolated percentile (`pct` in 0..=100) over already sorted values.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (len as f64 - 1.0);
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile_sorted(&sorted, pct))
}

/// Pearson correlation over the rows where both sides are present.
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect::<Vec<_>>();
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_matches_hand_computed_values() {
        let summary = Summary::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).expect("summary");
        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.q1, 2.0);
        assert_eq!(summary.q3, 4.0);
        assert!((summary.std_dev - 1.5811).abs() < 1e-4);
        assert_eq!(summary.skew(), SkewDirection::Symmetric);
    }

    #[test]
    fn long_right_tail_is_right_skewed() {
        let summary = Summary::from_values(&[1.0, 1.0, 1.0, 2.0, 50.0]).expect("summary");
        assert_eq!(summary.skew(), SkewDirection::Right);
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(Summary::from_values(&[]).is_none());
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn pearson_detects_perfect_relationships() {
        let xs = [Some(1.0), Some(2.0), Some(3.0), None, Some(4.0)];
        let ys = [Some(2.0), Some(4.0), Some(6.0), Some(1.0), Some(8.0)];
        let r = pearson(&xs, &ys).expect("correlation");
        assert!((r - 1.0).abs() < 1e-9);
        let inverse = ys.iter().map(|v| v.map(|y| -y)).collect::<Vec<_>>();
        assert!((pearson(&xs, &inverse).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_series_has_no_correlation() {
        let xs = [Some(1.0), Some(1.0), Some(1.0)];
        let ys = [Some(2.0), Some(3.0), Some(4.0)];
        assert!(pearson(&xs, &ys).is_none());
    }
}
