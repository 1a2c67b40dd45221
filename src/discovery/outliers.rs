use crate::{
    data::normalize_key,
    frequency::{ValueCounts, grouped_values},
    stats::{self, percentile, round_to},
};

use super::{Discovery, DiscoveryCategory, Evidence, Scope, Severity, fmt_amount, fmt_pct};

const EPSILON: f64 = 1e-9;

pub(super) fn anomalies(scope: &Scope<'_>) -> Vec<Discovery> {
    let mut discoveries = Vec::new();
    if let Some(score) = scope.columns.score.as_deref() {
        discoveries.extend(bounded_extremes(scope, score));
    }
    discoveries.extend(high_input_low_outcome(scope));
    discoveries
}

fn anomaly_severity(scope: &Scope<'_>, pct: f64) -> Severity {
    let policy = scope.policy;
    Severity::classify(
        pct,
        Some(policy.anomaly_critical),
        policy.anomaly_high,
        policy.anomaly_moderate,
    )
}

fn bounded_extremes(scope: &Scope<'_>, score: &str) -> Vec<Discovery> {
    let values = scope.dataset.numeric_values(score);
    if values.is_empty() {
        return Vec::new();
    }
    let total = values.len();
    let floor = scope.policy.score_floor;
    let ceiling = scope.policy.score_ceiling;
    let at_floor = values.iter().filter(|v| (**v - floor).abs() < EPSILON).count();
    let at_ceiling = values.iter().filter(|v| **v >= ceiling - EPSILON).count();

    let mut discoveries = Vec::new();
    if at_floor > 0 {
        let pct = at_floor as f64 / total as f64 * 100.0;
        discoveries.push(Discovery::new(
            DiscoveryCategory::Anomalies,
            "zero_gpa",
            format!(
                "{at_floor} records ({}) have a {score} of exactly {floor}, which usually signals withdrawals, incomplete terms or data entry gaps",
                fmt_pct(pct)
            ),
            Evidence::from_columns([score])
                .count(at_floor)
                .percentage(round_to(pct, 2))
                .severity(anomaly_severity(scope, pct))
                .pattern("floor")
                .metric("floor_value", floor),
        ));
    }
    if at_ceiling > 0 {
        let pct = at_ceiling as f64 / total as f64 * 100.0;
        discoveries.push(Discovery::new(
            DiscoveryCategory::Anomalies,
            "perfect_gpa",
            format!(
                "{at_ceiling} records ({}) sit at the {score} ceiling of {ceiling}",
                fmt_pct(pct)
            ),
            Evidence::from_columns([score])
                .count(at_ceiling)
                .percentage(round_to(pct, 2))
                .severity(Severity::Low)
                .pattern("ceiling")
                .metric("ceiling_value", ceiling),
        ));
    }
    discoveries
}

/// Records in the top input quartile whose outcome still falls under the threshold.
fn high_input_low_outcome(scope: &Scope<'_>) -> Option<Discovery> {
    let (aid, score) = (scope.columns.aid.as_deref()?, scope.columns.score.as_deref()?);
    let inputs = scope.dataset.numeric_column(aid);
    let outcomes = scope.dataset.numeric_column(score);
    let present = inputs.iter().flatten().copied().collect::<Vec<_>>();
    let cutoff = percentile(&present, scope.policy.high_input_percentile)?;
    let threshold = scope.policy.low_outcome_threshold;

    let mut paired = 0usize;
    let mut flagged = 0usize;
    let mut exposure = 0.0;
    for (input, outcome) in inputs.iter().zip(&outcomes) {
        let (Some(input), Some(outcome)) = (input, outcome) else {
            continue;
        };
        paired += 1;
        if *input > cutoff && *outcome < threshold {
            flagged += 1;
            exposure += input;
        }
    }
    if flagged == 0 {
        return None;
    }
    let pct = flagged as f64 / paired as f64 * 100.0;
    Some(Discovery::new(
        DiscoveryCategory::Anomalies,
        "high_aid_low_gpa",
        format!(
            "{flagged} records receive {aid} above the {:.0}th percentile ({}) yet hold a {score} below {threshold}, tying up {} in support",
            scope.policy.high_input_percentile,
            fmt_amount(cutoff),
            fmt_amount(exposure)
        ),
        Evidence::from_columns([aid, score])
            .count(flagged)
            .percentage(round_to(pct, 2))
            .amount(round_to(exposure, 2))
            .severity(anomaly_severity(scope, pct))
            .pattern("misallocation")
            .metric("input_cutoff", round_to(cutoff, 2))
            .metric("outcome_threshold", threshold),
    ))
}

pub(super) fn opportunities(scope: &Scope<'_>) -> Vec<Discovery> {
    let mut discoveries = Vec::new();
    discoveries.extend(unfunded_high_achievers(scope));
    if let Some(score) = scope.columns.score.as_deref() {
        for column in [
            scope.columns.nationality.as_deref(),
            scope.columns.program.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            discoveries.extend(underrepresented_groups(scope, column, score));
        }
    }
    discoveries
}

fn unfunded_high_achievers(scope: &Scope<'_>) -> Option<Discovery> {
    let (aid, score) = (scope.columns.aid.as_deref()?, scope.columns.score.as_deref()?);
    let bar = scope.policy.high_outcome_threshold;
    let inputs = scope.dataset.numeric_column(aid);
    let outcomes = scope.dataset.numeric_column(score);
    let mut paired = 0usize;
    let mut candidates = Vec::new();
    for (input, outcome) in inputs.into_iter().zip(outcomes) {
        let (Some(input), Some(outcome)) = (input, outcome) else {
            continue;
        };
        paired += 1;
        if input.abs() < EPSILON && outcome >= bar {
            candidates.push(outcome);
        }
    }
    if candidates.is_empty() {
        return None;
    }
    let pct = candidates.len() as f64 / paired as f64 * 100.0;
    let avg = stats::mean(&candidates)?;
    Some(Discovery::new(
        DiscoveryCategory::Opportunities,
        "unfunded_high_achievers",
        format!(
            "{} records ({}) reach a {score} of at least {bar} without any {aid}; they average {avg:.2} and are natural candidates for merit support",
            candidates.len(),
            fmt_pct(pct)
        ),
        Evidence::from_columns([aid, score])
            .count(candidates.len())
            .percentage(round_to(pct, 2))
            .pattern("merit_gap")
            .metric("mean_outcome", round_to(avg, 3)),
    ))
}

fn underrepresented_groups(scope: &Scope<'_>, column: &str, score: &str) -> Vec<Discovery> {
    let policy = scope.policy;
    let counts = ValueCounts::for_column(scope.dataset, column);
    let grouped = grouped_values(scope.dataset, column, score);
    let mut candidates = counts
        .sorted()
        .into_iter()
        .filter_map(|(group, count)| {
            let share = counts.percent(count);
            if share >= policy.underrepresented_share || count < policy.min_opportunity_group {
                return None;
            }
            let avg = stats::mean(grouped.get(&group)?)?;
            (avg >= policy.high_outcome_threshold).then_some((group, count, share, avg))
        })
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| b.3.total_cmp(&a.3).then_with(|| a.0.cmp(&b.0)));
    candidates.truncate(policy.max_opportunity_groups);

    candidates
        .into_iter()
        .map(|(group, count, share, avg)| {
            Discovery::new(
                DiscoveryCategory::Opportunities,
                format!("emerging_{}_{}", normalize_key(column), normalize_key(&group)),
                format!(
                    "{group} makes up only {} of {column} yet averages {avg:.2} {score} across {count} records, an under-served high performer",
                    fmt_pct(share)
                ),
                Evidence::from_columns([column, score])
                    .count(count)
                    .percentage(round_to(share, 2))
                    .pattern("underrepresented")
                    .metric("mean_outcome", round_to(avg, 3))
                    .label("group", group.clone()),
            )
        })
        .collect()
}
