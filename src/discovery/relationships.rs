use crate::{
    data::normalize_key,
    frequency::{ValueCounts, grouped_values},
    stats::{self, pearson, round_to},
};

use super::{Discovery, DiscoveryCategory, Evidence, Scope, Severity};

fn is_identifier(column: &str) -> bool {
    let key = normalize_key(column);
    key == "id" || key.ends_with("_id") || key.starts_with("id_") || key.ends_with("_no")
}

pub(super) fn correlations(scope: &Scope<'_>) -> Vec<Discovery> {
    let mut discoveries = numeric_pairs(scope);
    discoveries.extend(exposure_effect(scope));
    discoveries
}

fn numeric_pairs(scope: &Scope<'_>) -> Vec<Discovery> {
    let columns = scope
        .dataset
        .numeric_columns()
        .into_iter()
        .filter(|c| !is_identifier(c) && scope.columns.student_id.as_deref() != Some(*c))
        .collect::<Vec<_>>();
    let series = columns
        .iter()
        .map(|c| scope.dataset.numeric_column(c))
        .collect::<Vec<_>>();

    let mut candidates = Vec::new();
    for left in 0..columns.len() {
        for right in (left + 1)..columns.len() {
            let Some(r) = pearson(&series[left], &series[right]) else {
                continue;
            };
            if r.abs() > scope.policy.correlation_threshold {
                let pairs = series[left]
                    .iter()
                    .zip(&series[right])
                    .filter(|(a, b)| a.is_some() && b.is_some())
                    .count();
                candidates.push((columns[left], columns[right], r, pairs));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
    candidates.truncate(scope.policy.max_correlations);

    candidates
        .into_iter()
        .map(|(left, right, r, pairs)| {
            let direction = if r > 0.0 { "positive" } else { "negative" };
            let strength = if r.abs() > scope.policy.correlation_strong {
                "strong"
            } else if r.abs() > scope.policy.correlation_moderate {
                "moderate"
            } else {
                "weak"
            };
            let insight = format!(
                "{left} and {right} show a {strength} {direction} correlation (r = {r:.2}) across {pairs} records"
            );
            Discovery::new(
                DiscoveryCategory::Correlations,
                format!("{}_vs_{}", normalize_key(left), normalize_key(right)),
                insight,
                Evidence::from_columns([left, right])
                    .correlation(round_to(r, 3))
                    .count(pairs)
                    .pattern(direction)
                    .label("strength", strength),
            )
        })
        .collect()
}

/// Compares the outcome mean of records that received the input against those that did not.
fn exposure_effect(scope: &Scope<'_>) -> Option<Discovery> {
    let (aid, score) = (scope.columns.aid.as_deref()?, scope.columns.score.as_deref()?);
    let inputs = scope.dataset.numeric_column(aid);
    let outcomes = scope.dataset.numeric_column(score);
    let mut exposed = Vec::new();
    let mut unexposed = Vec::new();
    for (input, outcome) in inputs.into_iter().zip(outcomes) {
        match (input, outcome) {
            (Some(i), Some(o)) if i > 0.0 => exposed.push(o),
            (Some(_), Some(o)) => unexposed.push(o),
            _ => {}
        }
    }
    let with_mean = stats::mean(&exposed)?;
    let without_mean = stats::mean(&unexposed)?;
    let difference = with_mean - without_mean;
    let threshold = scope.policy.mean_difference_threshold;
    let pattern = if difference > threshold {
        "positive"
    } else if difference < -threshold {
        "negative"
    } else {
        "neutral"
    };
    let total = exposed.len() + unexposed.len();
    let share = exposed.len() as f64 / total as f64 * 100.0;
    let insight = match pattern {
        "positive" => format!(
            "Records receiving {aid} average {with_mean:.2} {score} versus {without_mean:.2} without it, a lift of {difference:.2}"
        ),
        "negative" => format!(
            "Records receiving {aid} average {with_mean:.2} {score}, {:.2} below the {without_mean:.2} of those without it",
            difference.abs()
        ),
        _ => format!(
            "{aid} shows no material link to {score}: {with_mean:.2} with versus {without_mean:.2} without"
        ),
    };
    Some(Discovery::new(
        DiscoveryCategory::Correlations,
        "aid_impact_on_performance",
        insight,
        Evidence::from_columns([aid, score])
            .count(exposed.len())
            .percentage(round_to(share, 2))
            .pattern(pattern)
            .metric("mean_with_input", round_to(with_mean, 3))
            .metric("mean_without_input", round_to(without_mean, 3))
            .metric("mean_difference", round_to(difference, 3)),
    ))
}

pub(super) fn segments(scope: &Scope<'_>) -> Vec<Discovery> {
    let Some(score) = scope.columns.score.as_deref() else {
        return Vec::new();
    };
    let policy = scope.policy;
    let mut discoveries = Vec::new();
    for column in scope.dataset.categorical_columns() {
        if scope.columns.student_id.as_deref() == Some(column) {
            continue;
        }
        let distinct = ValueCounts::for_column(scope.dataset, column).distinct();
        if distinct < 2 || distinct > policy.max_segment_distinct {
            continue;
        }
        let mut groups = grouped_values(scope.dataset, column, score)
            .into_iter()
            .filter(|(_, values)| values.len() >= policy.min_group_size)
            .filter_map(|(name, values)| {
                let summary = stats::Summary::from_values(&values)?;
                Some((name, summary))
            })
            .collect::<Vec<_>>();
        if groups.len() < 2 {
            continue;
        }
        groups.sort_by(|a, b| b.1.mean.total_cmp(&a.1.mean).then_with(|| a.0.cmp(&b.0)));
        let means = groups.iter().map(|(_, s)| s.mean).collect::<Vec<_>>();
        let spread_std = stats::std_dev(&means);
        let (top_name, top) = &groups[0];
        let (bottom_name, bottom) = &groups[groups.len() - 1];
        let severity = Severity::classify(
            spread_std,
            None,
            policy.segment_variance_high,
            policy.segment_variance_moderate,
        );
        let insight = format!(
            "Across {} {column} groups, average {score} ranges from {:.2} ({bottom_name}, n={}) to {:.2} ({top_name}, n={}); cross-group deviation is {spread_std:.2}",
            groups.len(),
            bottom.mean,
            bottom.count,
            top.mean,
            top.count,
        );
        discoveries.push(Discovery::new(
            DiscoveryCategory::Segments,
            format!("{}_by_{}", normalize_key(score), normalize_key(column)),
            insight,
            Evidence::from_columns([column, score])
                .count(groups.len())
                .variance(round_to(spread_std, 3))
                .severity(severity)
                .pattern(if severity >= Severity::High {
                    "divergent"
                } else {
                    "consistent"
                })
                .metric("top_mean", round_to(top.mean, 3))
                .metric("top_std", round_to(top.std_dev, 3))
                .metric("bottom_mean", round_to(bottom.mean, 3))
                .metric("bottom_std", round_to(bottom.std_dev, 3))
                .metric("gap", round_to(top.mean - bottom.mean, 3))
                .label("top_group", top_name.clone())
                .label("bottom_group", bottom_name.clone()),
        ));
    }
    discoveries
}
