//! Precomputed aggregates shared read-only by every stage of a run.

use std::collections::BTreeMap;

use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::{
    columns::{AID, GENDER, NATIONALITY, PROGRAM, REVENUE, SCORE, SemanticColumns},
    dataset::Dataset,
    discovery::fmt_amount,
    frequency::ValueCounts,
    stats::{Summary, round_to},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSnapshot {
    values: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: &Dataset, columns: &SemanticColumns) -> Self {
        let mut snapshot = Self::new();
        snapshot.insert("total_records", dataset.len() as f64);
        snapshot.insert("total_columns", dataset.columns().len() as f64);
        let cells = dataset.len() * dataset.columns().len();
        if cells > 0 {
            let present = dataset
                .rows()
                .iter()
                .flatten()
                .filter(|value| !value.is_missing())
                .count();
            snapshot.insert("completeness", round_to(present as f64 / cells as f64, 4));
        }

        if let Some(score) = columns.score.as_deref()
            && let Some(summary) = Summary::from_values(&dataset.numeric_values(score))
        {
            snapshot.insert(&format!("avg_{SCORE}"), round_to(summary.mean, 3));
            snapshot.insert(&format!("median_{SCORE}"), round_to(summary.median, 3));
            snapshot.insert(&format!("{SCORE}_std"), round_to(summary.std_dev, 3));
        }
        if let Some(aid) = columns.aid.as_deref() {
            let values = dataset.numeric_values(aid);
            let recipients = values.iter().filter(|v| **v > 0.0).count();
            snapshot.insert(&format!("total_{AID}"), round_to(values.iter().sum(), 2));
            snapshot.insert(&format!("{AID}_recipients"), recipients as f64);
            if !values.is_empty() {
                snapshot.insert(
                    &format!("{AID}_recipient_share"),
                    round_to(recipients as f64 / values.len() as f64, 4),
                );
            }
        }
        if let Some(revenue) = columns.revenue.as_deref() {
            let values = dataset.numeric_values(revenue);
            snapshot.insert(&format!("total_{REVENUE}"), round_to(values.iter().sum(), 2));
            if let Some(summary) = Summary::from_values(&values) {
                snapshot.insert(&format!("avg_{REVENUE}"), round_to(summary.mean, 2));
            }
        }
        for (semantic, column) in [
            (NATIONALITY, &columns.nationality),
            (PROGRAM, &columns.program),
            (GENDER, &columns.gender),
        ] {
            let Some(column) = column.as_deref() else {
                continue;
            };
            let counts = ValueCounts::for_column(dataset, column);
            if counts.total() == 0 {
                continue;
            }
            snapshot.insert(&format!("unique_{semantic}"), counts.distinct() as f64);
            snapshot.insert(
                &format!("top_{semantic}_share"),
                round_to(counts.top_share(1) / 100.0, 4),
            );
        }
        snapshot
    }

    pub fn insert(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, f64)> for MetricSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Renders a metric value the way prompts and narratives quote it.
///
/// Whole numbers print as grouped integers, amounts above a thousand carry
/// the currency label, anything above a million collapses to an `M` figure
/// and fractions between zero and one read as percentages.
pub fn format_metric_value(value: f64, currency: &str) -> String {
    if value > 1_000_000.0 {
        return format!("{currency} {:.2}M", value / 1_000_000.0);
    }
    let whole = value.fract() == 0.0;
    if whole {
        return fmt_amount(value);
    }
    if value > 1000.0 {
        format!("{currency} {}", fmt_amount(value))
    } else if value > 0.0 && value < 1.0 {
        format!("{:.1}%", value * 100.0)
    } else {
        format!("{value:.1}")
    }
}

/// One `- Readable Key: value` line per metric, at most `max_items` lines.
pub fn format_metrics_for_prompt(
    snapshot: &MetricSnapshot,
    max_items: usize,
    currency: &str,
) -> String {
    snapshot
        .iter()
        .take(max_items)
        .map(|(key, value)| {
            format!(
                "- {}: {}",
                key.to_title_case(),
                format_metric_value(value, currency)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
