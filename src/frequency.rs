use std::collections::{BTreeMap, HashMap};

use crate::dataset::Dataset;

/// Value counts for one categorical column; missing cells are not counted.
#[derive(Debug, Clone, Default)]
pub struct ValueCounts {
    total: usize,
    counts: HashMap<String, usize>,
}

impl ValueCounts {
    pub fn for_column(dataset: &Dataset, column: &str) -> Self {
        let mut counts = Self::default();
        for value in dataset.category_column(column).into_iter().flatten() {
            counts.record(value);
        }
        counts
    }

    pub fn record(&mut self, value: &str) {
        self.total += 1;
        *self.counts.entry(value.to_string()).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, value: &str) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Entries ordered by descending count, ties broken alphabetically.
    pub fn sorted(&self) -> Vec<(String, usize)> {
        let mut items = self
            .counts
            .iter()
            .map(|(value, count)| (value.clone(), *count))
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        items
    }

    pub fn top(&self, n: usize) -> Vec<(String, usize)> {
        let mut items = self.sorted();
        items.truncate(n);
        items
    }

    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    /// Percentage of all counted cells held by the `n` most frequent values.
    pub fn top_share(&self, n: usize) -> f64 {
        let covered = self.top(n).iter().map(|(_, count)| count).sum::<usize>();
        self.percent(covered)
    }

    /// Shannon entropy normalised by `ln(distinct)`, scaled to 0..=100.
    pub fn diversity_index(&self) -> f64 {
        if self.total == 0 || self.counts.len() < 2 {
            return 0.0;
        }
        let total = self.total as f64;
        let entropy = self
            .counts
            .values()
            .map(|count| {
                let p = *count as f64 / total;
                -p * p.ln()
            })
            .sum::<f64>();
        entropy / (self.counts.len() as f64).ln() * 100.0
    }
}

/// Numeric values of `value_column` grouped by the category in `group_column`.
pub fn grouped_values(
    dataset: &Dataset,
    group_column: &str,
    value_column: &str,
) -> BTreeMap<String, Vec<f64>> {
    let groups = dataset.category_column(group_column);
    let values = dataset.numeric_column(value_column);
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (group, value) in groups.into_iter().zip(values) {
        if let (Some(group), Some(value)) = (group, value) {
            grouped.entry(group.to_string()).or_default().push(value);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(values: &[(&str, usize)]) -> ValueCounts {
        let mut counts = ValueCounts::default();
        for (value, n) in values {
            for _ in 0..*n {
                counts.record(value);
            }
        }
        counts
    }

    #[test]
    fn top_share_covers_most_frequent_values() {
        let counts = counts(&[("a", 50), ("b", 30), ("c", 10), ("d", 10)]);
        assert_eq!(counts.total(), 100);
        assert_eq!(counts.top(1)[0], ("a".to_string(), 50));
        assert!((counts.top_share(3) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_distribution_has_full_diversity() {
        let counts = counts(&[("a", 10), ("b", 10), ("c", 10), ("d", 10)]);
        assert!((counts.diversity_index() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn single_value_has_zero_diversity() {
        let counts = counts(&[("only", 7)]);
        assert_eq!(counts.diversity_index(), 0.0);
    }

    #[test]
    fn ties_sort_alphabetically() {
        let counts = counts(&[("b", 2), ("a", 2), ("c", 5)]);
        let sorted = counts.sorted();
        assert_eq!(sorted[0].0, "c");
        assert_eq!(sorted[1].0, "a");
        assert_eq!(sorted[2].0, "b");
    }
}
