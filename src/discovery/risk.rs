use itertools::Itertools;

use crate::{frequency::ValueCounts, stats::round_to};

use super::{Discovery, DiscoveryCategory, Evidence, Scope, Severity, fmt_amount, fmt_pct};

pub(super) fn risks(scope: &Scope<'_>) -> Vec<Discovery> {
    let mut discoveries = Vec::new();
    if let Some(column) = scope.columns.nationality.as_deref() {
        discoveries.extend(concentration(scope, column, "market_concentration", "market"));
    }
    if let Some(column) = scope.columns.program.as_deref() {
        discoveries.extend(concentration(scope, column, "program_concentration", "portfolio"));
    }
    discoveries.extend(sustainability(scope));
    discoveries
}

fn concentration(scope: &Scope<'_>, column: &str, key: &str, noun: &str) -> Option<Discovery> {
    let counts = ValueCounts::for_column(scope.dataset, column);
    if counts.distinct() < 2 {
        return None;
    }
    let policy = scope.policy;
    let top = counts.top(3);
    let top3 = counts.top_share(3);
    let top1 = counts.percent(top.first().map_or(0, |(_, c)| *c));
    let severity = Severity::classify(
        top3,
        Some(policy.concentration_critical),
        policy.concentration_high,
        policy.concentration_moderate,
    );
    let leaders = top.iter().map(|(name, _)| name.as_str()).join(", ");
    let insight = format!(
        "The top 3 {column} values ({leaders}) account for {} of {} records; {noun} concentration is {severity}",
        fmt_pct(top3),
        counts.total()
    );
    Some(Discovery::new(
        DiscoveryCategory::Risks,
        key,
        insight,
        Evidence::from_columns([column])
            .count(counts.total())
            .percentage(round_to(top3, 2))
            .severity(severity)
            .pattern("concentration")
            .metric("top_3_percentage", round_to(top3, 2))
            .metric("top_1_percentage", round_to(top1, 2))
            .metric("distinct_values", counts.distinct() as f64)
            .label("leaders", leaders),
    ))
}

/// Share of total revenue handed back as aid.
fn sustainability(scope: &Scope<'_>) -> Option<Discovery> {
    let (aid, revenue) = (scope.columns.aid.as_deref()?, scope.columns.revenue.as_deref()?);
    let total_aid = scope.dataset.numeric_values(aid).iter().sum::<f64>();
    let total_revenue = scope.dataset.numeric_values(revenue).iter().sum::<f64>();
    if total_revenue <= 0.0 {
        return None;
    }
    let policy = scope.policy;
    let ratio = total_aid / total_revenue * 100.0;
    let severity = Severity::classify(
        ratio,
        Some(policy.sustainability_critical),
        policy.sustainability_high,
        policy.sustainability_moderate,
    );
    Some(Discovery::new(
        DiscoveryCategory::Risks,
        "aid_sustainability",
        format!(
            "{aid} totals {} against {} of {revenue}, a coverage ratio of {}; sustainability risk is {severity}",
            fmt_amount(total_aid),
            fmt_amount(total_revenue),
            fmt_pct(ratio)
        ),
        Evidence::from_columns([aid, revenue])
            .amount(round_to(total_aid, 2))
            .percentage(round_to(ratio, 2))
            .severity(severity)
            .pattern("sustainability")
            .metric("total_revenue", round_to(total_revenue, 2))
            .metric("coverage_ratio", round_to(ratio, 2)),
    ))
}
