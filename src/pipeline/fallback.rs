//! Statistical stand-ins for model output.

use crate::{
    columns::{SCORE, SemanticColumns},
    data::ColumnKind,
    dataset::Dataset,
    discovery::{DiscoveryCategory, Severity, fmt_amount, fmt_pct},
    frequency::ValueCounts,
    stats::{SkewDirection, Summary, pearson},
    visualize::VisualizationSpec,
};

use super::ItemContext;

fn skew_phrase(summary: &Summary) -> &'static str {
    match summary.skew() {
        SkewDirection::Right => "right-skewed, with a small group of high values pulling the mean above the median",
        SkewDirection::Left => "left-skewed, with a tail of low values dragging the mean below the median",
        SkewDirection::Symmetric => "roughly symmetric around its centre",
    }
}

fn score_template(column: &str, s: &Summary) -> String {
    format!(
        "{column} averages {:.2} (median {:.2}, std {:.2}); the middle half of records sits between {:.2} and {:.2}, and the distribution is {}.",
        s.mean,
        s.median,
        s.std_dev,
        s.q1,
        s.q3,
        skew_phrase(s)
    )
}

fn monetary_template(column: &str, s: &Summary, currency: &str) -> String {
    format!(
        "{column} averages {currency} {} against a median of {currency} {}; half of all amounts fall between {} and {}, totalling {currency} {} and {}.",
        fmt_amount(s.mean),
        fmt_amount(s.median),
        fmt_amount(s.q1),
        fmt_amount(s.q3),
        fmt_amount(s.sum),
        skew_phrase(s)
    )
}

fn numeric_template(column: &str, s: &Summary) -> String {
    format!(
        "{column} ranges from {:.2} to {:.2} with a mean of {:.2} and a median of {:.2}; the distribution is {}.",
        s.min,
        s.max,
        s.mean,
        s.median,
        skew_phrase(s)
    )
}

fn categorical_template(column: &str, counts: &ValueCounts) -> String {
    let top = counts.top(3);
    let Some((leader, leader_count)) = top.first() else {
        return format!("{column} has no populated values.");
    };
    format!(
        "{leader} is the most common {column} value at {} of records; {} distinct values appear and the top {} together cover {}.",
        fmt_pct(counts.percent(*leader_count)),
        counts.distinct(),
        top.len(),
        fmt_pct(counts.top_share(3))
    )
}

/// Descriptive-statistics insight for a chart's primary column.
pub(super) fn chart_insight(
    spec: &VisualizationSpec,
    dataset: &Dataset,
    columns: &SemanticColumns,
    currency: &str,
) -> String {
    let column = spec.primary_column();
    let mut insight = match dataset.column_kind(column) {
        Some(ColumnKind::Numeric) => match Summary::from_values(&dataset.numeric_values(column)) {
            Some(summary) if columns.role_of(column) == Some(SCORE) => {
                score_template(column, &summary)
            }
            Some(summary) if columns.is_monetary(column) => {
                monetary_template(column, &summary, currency)
            }
            Some(summary) => numeric_template(column, &summary),
            None => format!("{column} has no numeric values to summarise."),
        },
        Some(ColumnKind::Categorical) => {
            categorical_template(column, &ValueCounts::for_column(dataset, column))
        }
        Some(ColumnKind::Date) | None => format!(
            "{column} is populated for {} of {} records.",
            (0..dataset.len())
                .filter(|row| dataset.value(*row, column).is_some_and(|v| !v.is_missing()))
                .count(),
            dataset.len()
        ),
    };

    if let [first, second] = spec.target_columns.as_slice()
        && dataset.column_kind(first) == Some(ColumnKind::Numeric)
        && dataset.column_kind(second) == Some(ColumnKind::Numeric)
        && let Some(r) = pearson(&dataset.numeric_column(first), &dataset.numeric_column(second))
    {
        insight.push_str(&format!(" Its correlation with {first} is {r:.2}."));
    }
    insight
}

fn severity_word(context: &ItemContext) -> &'static str {
    context
        .evidence
        .severity
        .map(|s| match s {
            Severity::Critical => "a critical",
            Severity::High => "a high",
            Severity::Moderate => "a moderate",
            Severity::Low => "a low",
        })
        .unwrap_or("a measurable")
}

fn evidence_column(context: &ItemContext, idx: usize) -> &str {
    context
        .evidence
        .columns
        .get(idx)
        .map(String::as_str)
        .unwrap_or("the affected column")
}

/// Root-cause and impact clause built from the evidence of a finding.
pub(super) fn finding_clause(context: &ItemContext, currency: &str) -> String {
    let evidence = &context.evidence;
    let count = evidence.count.unwrap_or_default();
    let pct = evidence.percentage.map(fmt_pct).unwrap_or_else(|| "a share".to_string());
    let Some(category) = context.category else {
        return "Root cause: this reflects the overall shape of the data. Impact: it frames how every other finding in this report should be read.".to_string();
    };
    match category {
        DiscoveryCategory::Correlations => match evidence.correlation {
            Some(r) => format!(
                "Root cause: {} and {} move together (r = {r:.2}). Impact: changes in one are a usable early signal for the other.",
                evidence_column(context, 0),
                evidence_column(context, 1)
            ),
            None => format!(
                "Root cause: outcomes differ by {:.2} points between records with and without {}. Impact: support decisions are visible in results.",
                evidence.get_metric("mean_difference").unwrap_or_default().abs(),
                evidence_column(context, 0)
            ),
        },
        DiscoveryCategory::Segments => format!(
            "Root cause: results differ systematically across {} groups (deviation {:.2}). Impact: institution-wide averages hide a gap of {:.2} points.",
            evidence_column(context, 0),
            evidence.variance.unwrap_or_default(),
            evidence.get_metric("gap").unwrap_or_default()
        ),
        DiscoveryCategory::Anomalies => {
            let exposure = evidence
                .amount
                .map(|a| format!(", with {currency} {} tied up", fmt_amount(a)))
                .unwrap_or_default();
            format!(
                "Root cause: {count} records ({pct}) fall outside normal ranges, typically withdrawals, incomplete terms or entry errors. Impact: headline figures are distorted{exposure}."
            )
        }
        DiscoveryCategory::Opportunities => format!(
            "Root cause: {count} strong performers ({pct}) receive little targeted attention. Impact: they represent untapped potential for retention and reputation."
        ),
        DiscoveryCategory::Risks => format!(
            "Root cause: {pct} of the base depends on a few sources. Impact: {} exposure to any shock in those sources.",
            severity_word(context)
        ),
        DiscoveryCategory::FinancialPatterns => format!(
            "Root cause: award size is {} related to outcomes (lift {:.2}). Impact: spend efficiency depends on how awards are tiered.",
            match evidence.pattern.as_deref() {
                Some("increasing") => "positively",
                Some("decreasing") => "inversely",
                _ => "only weakly",
            },
            evidence.get_metric("tier_lift").unwrap_or_default()
        ),
        DiscoveryCategory::AcademicPatterns => format!(
            "Root cause: performance is {} across the scale. Impact: support capacity should follow where records concentrate.",
            evidence.pattern.as_deref().unwrap_or("distributed unevenly")
        ),
        DiscoveryCategory::MarketPatterns => format!(
            "Root cause: the population draws on {} distinct markets (index {:.1}). Impact: {} diversity shapes both resilience and campus experience.",
            evidence.get_metric("distinct_values").unwrap_or_default(),
            evidence.get_metric("diversity_index").unwrap_or_default(),
            evidence.pattern.as_deref().unwrap_or("current")
        ),
    }
}

/// Action and expected-outcome clause built from the evidence of a recommendation.
pub(super) fn recommendation_clause(context: &ItemContext, currency: &str) -> String {
    let evidence = &context.evidence;
    let count = evidence.count.unwrap_or_default();
    let Some(category) = context.category else {
        return "Action: assign an owner and a review date. Expected outcome: the baseline in this report becomes a tracked target.".to_string();
    };
    match category {
        DiscoveryCategory::Correlations => "Action: add the pair to the termly dashboard. Expected outcome: earlier visibility of shifts in performance.".to_string(),
        DiscoveryCategory::Segments => format!(
            "Action: run a focused review of the lowest {} group within 90 days. Expected outcome: a narrower gap than the current {:.2} points.",
            evidence_column(context, 0),
            evidence.get_metric("gap").unwrap_or_default()
        ),
        DiscoveryCategory::Anomalies => format!(
            "Action: verify the {count} flagged records with the registrar within 30 days. Expected outcome: cleaner reporting{}.",
            evidence
                .amount
                .map(|a| format!(" and a decision on {currency} {} in support", fmt_amount(a)))
                .unwrap_or_default()
        ),
        DiscoveryCategory::Opportunities => format!(
            "Action: shortlist the {count} candidates for the next award round. Expected outcome: higher retention among strong performers."
        ),
        DiscoveryCategory::Risks => format!(
            "Action: set a diversification target below {}. Expected outcome: reduced exposure from {} to a tolerable level.",
            fmt_pct(evidence.percentage.unwrap_or_default().min(60.0)),
            severity_word(context).trim_start_matches("a ")
        ),
        DiscoveryCategory::FinancialPatterns => "Action: model two alternative tier structures against last year's outcomes. Expected outcome: more performance per unit of aid.".to_string(),
        DiscoveryCategory::AcademicPatterns => "Action: trigger advising for records in the lowest band at mid-term. Expected outcome: fewer records ending the year at the floor.".to_string(),
        DiscoveryCategory::MarketPatterns => "Action: set recruitment targets by market for the next intake. Expected outcome: a steadier diversity index year on year.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Evidence;

    #[test]
    fn anomaly_clause_quotes_count_and_exposure() {
        let context = ItemContext {
            category: Some(DiscoveryCategory::Anomalies),
            key: "high_aid_low_gpa".into(),
            evidence: Evidence::from_columns(["aid", "gpa"])
                .count(12)
                .percentage(3.0)
                .amount(250_000.0),
        };
        let clause = finding_clause(&context, "AED");
        assert!(clause.starts_with("Root cause: 12 records (3.0%)"));
        assert!(clause.contains("AED 250,000 tied up"));
    }

    #[test]
    fn metric_items_get_generic_clauses() {
        let context = ItemContext::from_metric("total_records", 10.0);
        assert!(finding_clause(&context, "AED").starts_with("Root cause:"));
        assert!(recommendation_clause(&context, "AED").starts_with("Action:"));
    }
}
