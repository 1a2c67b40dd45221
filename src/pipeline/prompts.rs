use serde_json::Value as Json;

use crate::{
    data::ColumnKind,
    dataset::Dataset,
    frequency::ValueCounts,
    metrics::{MetricSnapshot, format_metric_value, format_metrics_for_prompt},
    parser::string_field,
    stats::Summary,
    visualize::{AnalysisContext, VisualizationSpec},
};

use super::FindingOrRecommendation;

const PROMPT_METRICS: usize = 10;
const PROMPT_TOP_VALUES: usize = 5;

fn column_statistics(dataset: &Dataset, column: &str, currency: &str) -> String {
    match dataset.column_kind(column) {
        Some(ColumnKind::Numeric) => match Summary::from_values(&dataset.numeric_values(column)) {
            Some(s) => format!(
                "- {column} (numeric): count {}, mean {}, median {}, std {:.2}, min {}, q1 {}, q3 {}, max {}",
                s.count,
                format_metric_value(s.mean, currency),
                format_metric_value(s.median, currency),
                s.std_dev,
                format_metric_value(s.min, currency),
                format_metric_value(s.q1, currency),
                format_metric_value(s.q3, currency),
                format_metric_value(s.max, currency),
            ),
            None => format!("- {column} (numeric): no values"),
        },
        Some(ColumnKind::Categorical) => {
            let counts = ValueCounts::for_column(dataset, column);
            let top = counts
                .top(PROMPT_TOP_VALUES)
                .into_iter()
                .map(|(value, count)| format!("{value} {:.1}%", counts.percent(count)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "- {column} (categorical): {} distinct values; top: {top}",
                counts.distinct()
            )
        }
        Some(ColumnKind::Date) => format!("- {column} (date)"),
        None => format!("- {column}: not present"),
    }
}

pub(super) fn chart_prompt(spec: &VisualizationSpec, dataset: &Dataset, currency: &str) -> String {
    let stats = spec
        .target_columns
        .iter()
        .map(|column| column_statistics(dataset, column, currency))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a data analyst describing one chart for university leadership.\n\n\
         Chart: {title} ({kind:?})\n\
         Purpose: {rationale}\n\n\
         Column statistics:\n{stats}\n\n\
         Write one or two sentences on the most important thing this chart shows, quoting at least one number.\n\
         Respond with JSON only, in the form {{\"insight\": \"...\"}}",
        title = spec.title,
        kind = spec.chart_kind,
        rationale = spec.rationale,
    )
}

fn item_prompt(
    role: &str,
    context: AnalysisContext,
    item: &FindingOrRecommendation,
    metrics: &MetricSnapshot,
    currency: &str,
    ask: &str,
    schema: &str,
) -> String {
    let evidence = serde_json::to_string(&item.context.evidence).unwrap_or_default();
    format!(
        "You are a higher education {role} reviewing a {context} analysis.\n\n\
         Statement: {text}\n\
         Evidence: {evidence}\n\n\
         Key Metrics:\n{metrics}\n\n\
         {ask}\n\
         Respond with JSON only, in the form {schema}",
        text = item.basic_text,
        metrics = format_metrics_for_prompt(metrics, PROMPT_METRICS, currency),
    )
}

pub(super) fn finding_prompt(
    context: AnalysisContext,
    finding: &FindingOrRecommendation,
    metrics: &MetricSnapshot,
    currency: &str,
) -> String {
    item_prompt(
        "analyst",
        context,
        finding,
        metrics,
        currency,
        "In one sentence each, give the most likely root cause of this finding and its impact on the institution.",
        "{\"root_cause\": \"...\", \"impact\": \"...\"}",
    )
}

pub(super) fn recommendation_prompt(
    context: AnalysisContext,
    recommendation: &FindingOrRecommendation,
    metrics: &MetricSnapshot,
    currency: &str,
) -> String {
    item_prompt(
        "strategy consultant",
        context,
        recommendation,
        metrics,
        currency,
        "In one sentence each, give the first concrete action to take and its expected outcome.",
        "{\"action\": \"...\", \"expected_outcome\": \"...\"}",
    )
}

fn clause(value: &Json, first: (&str, &str), second: (&str, &str)) -> Option<String> {
    let parts = [first, second]
        .into_iter()
        .filter_map(|(field, label)| {
            string_field(value, field)
                .map(|text| format!("{label}: {}.", text.trim_end_matches('.')))
        })
        .collect::<Vec<_>>();
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub(super) fn finding_clause(value: &Json) -> Option<String> {
    clause(value, ("root_cause", "Root cause"), ("impact", "Impact"))
}

pub(super) fn recommendation_clause(value: &Json) -> Option<String> {
    clause(
        value,
        ("action", "Action"),
        ("expected_outcome", "Expected outcome"),
    )
}
